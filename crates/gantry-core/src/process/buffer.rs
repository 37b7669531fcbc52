use std::collections::VecDeque;

pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

/// Keeps the most recent bytes of a stream up to a byte budget. Segments
/// carry their own line terminator, so a long line split into several reads
/// joins back together.
#[derive(Debug)]
pub struct TailBuffer {
    segments: VecDeque<String>,
    total_bytes: usize,
    limit: usize,
    truncated: bool,
}

impl Default for TailBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_LIMIT)
    }
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            segments: VecDeque::new(),
            total_bytes: 0,
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, segment: &str) {
        if segment.is_empty() {
            return;
        }
        if segment.len() >= self.limit {
            let cut = char_boundary_at_or_after(segment, segment.len() - self.limit);
            self.truncated |= cut > 0 || !self.segments.is_empty();
            self.segments.clear();
            self.segments.push_back(segment[cut..].to_string());
            self.total_bytes = segment.len() - cut;
            return;
        }

        self.total_bytes += segment.len();
        self.segments.push_back(segment.to_string());

        while self.total_bytes > self.limit {
            let excess = self.total_bytes - self.limit;
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            self.truncated = true;
            if front.len() <= excess {
                self.total_bytes -= front.len();
                self.segments.pop_front();
            } else {
                let cut = char_boundary_at_or_after(front, excess);
                front.drain(..cut);
                self.total_bytes -= cut;
            }
        }
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn joined(&self) -> String {
        let mut out = String::with_capacity(self.total_bytes);
        for segment in &self.segments {
            out.push_str(segment);
        }
        out
    }
}

fn char_boundary_at_or_after(text: &str, index: usize) -> usize {
    (index..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_tail_and_flags_truncation() {
        let mut buffer = TailBuffer::new(13);
        buffer.push("first\n");
        buffer.push("second\n");
        assert!(!buffer.truncated());

        buffer.push("third\n");
        assert!(buffer.truncated());
        assert_eq!(buffer.joined(), "second\nthird\n");
    }

    #[test]
    fn oversized_line_keeps_its_last_bytes() {
        let mut buffer = TailBuffer::new(12);
        buffer.push("earlier\n");
        buffer.push(&format!("{}FATAL: crash", "x".repeat(5000)));

        assert!(buffer.truncated());
        assert_eq!(buffer.joined(), "FATAL: crash");
    }

    #[test]
    fn partial_trim_respects_char_boundaries() {
        let mut buffer = TailBuffer::new(5);
        buffer.push("ééé");
        buffer.push("ab");

        assert!(buffer.truncated());
        assert_eq!(buffer.joined(), "éab");
    }
}
