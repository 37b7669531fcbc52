use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{
    normalize_legacy_path, CompositorSettings, ToolPaths, WindowType, WrapperSettings,
};
use crate::runtime::path_to_string;

/// Tokens to prepend to the runtime command, outermost wrapper first.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct WrapperChain {
    pub tokens: Vec<String>,
    pub notes: Vec<String>,
}

impl WrapperChain {
    fn push_wrapper(&mut self, program: String, args: impl IntoIterator<Item = String>) {
        self.tokens.push(program);
        self.tokens.extend(args);
    }
}

/// Orders every enabled wrapper around the main binary:
/// `[compositor?, custom..., overlay?, scheduler-hint?, sandbox...]`.
///
/// The compositor always comes first because every other wrapped process
/// renders into its surface; when it is active the overlay runs inside it
/// (`--mangoapp`) instead of as a separate wrapper. Sandbox entries sit
/// innermost so they never re-wrap another wrapper. Wrappers whose binary
/// cannot be found are skipped with a note.
pub fn build_wrapper_chain(wrappers: &WrapperSettings, tools: &ToolPaths) -> WrapperChain {
    let mut chain = WrapperChain::default();
    let compositor = &wrappers.compositor;

    let compositor_active = if compositor.enabled {
        match resolve_tool("gamescope", tools.gamescope.as_deref()) {
            Some(path) => {
                chain.push_wrapper(path, gamescope_args(compositor, wrappers.overlay));
                true
            }
            None => {
                chain
                    .notes
                    .push("compositor enabled but gamescope was not found; skipped".to_string());
                false
            }
        }
    } else {
        false
    };

    for custom in wrappers.custom.iter().filter(|custom| custom.enabled) {
        match resolve_wrapper_executable(custom.executable.trim()) {
            Some(path) => chain.push_wrapper(path, split_shell_like_args(&custom.args)),
            None => chain.notes.push(format!(
                "wrapper '{}' is not available; skipped",
                custom.executable
            )),
        }
    }

    if wrappers.overlay && !compositor_active {
        match resolve_tool("mangohud", tools.mangohud.as_deref()) {
            Some(path) => chain.push_wrapper(path, []),
            None => chain
                .notes
                .push("overlay enabled but mangohud was not found; skipped".to_string()),
        }
    }

    if wrappers.scheduler_hint {
        match resolve_tool("gamemoderun", tools.gamemoderun.as_deref()) {
            Some(path) => chain.push_wrapper(path, []),
            None => chain
                .notes
                .push("scheduler hint enabled but gamemoderun was not found; skipped".to_string()),
        }
    }

    if wrappers.sandbox_runtime {
        match tools
            .steam_runtime
            .as_deref()
            .map(normalize_legacy_path)
            .filter(|path| is_executable_file(path))
        {
            Some(entry_point) => chain.push_wrapper(
                path_to_string(&entry_point),
                ["--verb=waitforexitandrun".to_string(), "--".to_string()],
            ),
            None => chain.notes.push(
                "sandbox runtime enabled but no runtime entry point is configured; skipped"
                    .to_string(),
            ),
        }
    }

    chain.tokens.retain(|token| !token.trim().is_empty());
    chain
}

/// Gamescope flags up to and including the `--` separator.
pub fn gamescope_args(settings: &CompositorSettings, overlay: bool) -> Vec<String> {
    let mut args = Vec::new();

    push_dimension(&mut args, "-w", settings.game_width);
    push_dimension(&mut args, "-h", settings.game_height);
    push_dimension(&mut args, "-W", settings.output_width);
    push_dimension(&mut args, "-H", settings.output_height);

    let resolution_configured = settings.game_width.is_some()
        || settings.game_height.is_some()
        || settings.output_width.is_some()
        || settings.output_height.is_some();
    if resolution_configured {
        apply_upscale_flags(&mut args, &settings.upscale_method);
    }

    match settings.window_type {
        WindowType::Fullscreen => args.push("-f".to_string()),
        WindowType::Borderless => args.push("-b".to_string()),
        WindowType::Windowed => {}
    }

    if let Some(fps) = settings.fps_limit.filter(|fps| *fps > 0) {
        args.push("-r".to_string());
        args.push(fps.to_string());
    }
    if let Some(fps) = settings.fps_limit_no_focus.filter(|fps| *fps > 0) {
        args.push("-o".to_string());
        args.push(fps.to_string());
    }

    if settings.force_grab_cursor {
        args.push("--force-grab-cursor".to_string());
    }

    if overlay {
        args.push("--mangoapp".to_string());
    }

    args.extend(split_shell_like_args(&settings.additional_options));
    args.push("--".to_string());
    args
}

fn push_dimension(args: &mut Vec<String>, flag: &str, value: Option<u32>) {
    if let Some(value) = value.filter(|value| *value > 0) {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

fn apply_upscale_flags(args: &mut Vec<String>, raw_method: &str) {
    let method = raw_method.trim().to_ascii_lowercase();
    match method.as_str() {
        "fsr" | "nis" => {
            args.push("-F".to_string());
            args.push(method);
        }
        "integer" | "stretch" => {
            args.push("-S".to_string());
            args.push(method);
        }
        _ => {}
    }
}

/// Configured tool path first, then `name` on `PATH`.
pub fn resolve_tool(name: &str, configured: Option<&Path>) -> Option<String> {
    if let Some(path) = configured.map(normalize_legacy_path) {
        if is_executable_file(&path) {
            return Some(path_to_string(&path));
        }
    }

    find_in_path(name)
        .filter(|path| is_executable_file(path))
        .map(|path| path_to_string(&path))
}

pub fn resolve_wrapper_executable(executable: &str) -> Option<String> {
    if executable.is_empty() {
        return None;
    }

    let path = normalize_legacy_path(Path::new(executable));
    if executable.contains('/') || path.is_absolute() {
        return is_executable_file(&path).then(|| path_to_string(&path));
    }

    find_in_path(executable)
        .filter(|path| is_executable_file(path))
        .map(|path| path_to_string(&path))
}

fn find_in_path(bin_name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin_name))
        .find(|candidate| candidate.is_file())
}

fn is_executable_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        true
    }
}

fn split_shell_like_args(raw: &str) -> Vec<String> {
    // Whitespace split only; quoted arguments are not preserved.
    raw.split_whitespace().map(ToString::to_string).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::CustomWrapper;
    use crate::test_support::TestDir;

    struct Tools {
        _dir: TestDir,
        tools: ToolPaths,
        custom: String,
    }

    fn tools() -> Tools {
        let dir = TestDir::new("wrappers");
        let tools = ToolPaths {
            gamescope: Some(dir.script("bin/gamescope", "exit 0")),
            mangohud: Some(dir.script("bin/mangohud", "exit 0")),
            gamemoderun: Some(dir.script("bin/gamemoderun", "exit 0")),
            steam_runtime: Some(dir.script("runtime/_v2-entry-point", "exit 0")),
        };
        let custom = path_to_string(&dir.script("bin/strace", "exit 0"));
        Tools {
            _dir: dir,
            tools,
            custom,
        }
    }

    fn everything_enabled(custom: &str) -> WrapperSettings {
        WrapperSettings {
            compositor: CompositorSettings {
                enabled: true,
                ..CompositorSettings::default()
            },
            overlay: true,
            scheduler_hint: true,
            sandbox_runtime: true,
            custom: vec![CustomWrapper {
                executable: custom.to_string(),
                args: "-f  -o /tmp/trace".to_string(),
                enabled: true,
            }],
        }
    }

    fn program_index(chain: &WrapperChain, suffix: &str) -> Option<usize> {
        chain.tokens.iter().position(|token| token.ends_with(suffix))
    }

    #[test]
    fn compositor_is_first_and_sandbox_is_last_for_every_combination() {
        let fx = tools();

        for mask in 0u8..32 {
            let mut wrappers = everything_enabled(&fx.custom);
            wrappers.compositor.enabled = mask & 1 != 0;
            wrappers.overlay = mask & 2 != 0;
            wrappers.scheduler_hint = mask & 4 != 0;
            wrappers.sandbox_runtime = mask & 8 != 0;
            wrappers.custom[0].enabled = mask & 16 != 0;

            let chain = build_wrapper_chain(&wrappers, &fx.tools);

            if wrappers.compositor.enabled {
                assert_eq!(program_index(&chain, "/gamescope"), Some(0), "mask {mask}");
                assert_eq!(program_index(&chain, "/mangohud"), None, "mask {mask}");
            }
            if wrappers.sandbox_runtime {
                let tail = &chain.tokens[chain.tokens.len() - 3..];
                assert!(tail[0].ends_with("/_v2-entry-point"), "mask {mask}");
                assert_eq!(tail[2], "--");
            }
            assert!(chain.tokens.iter().all(|token| !token.is_empty()));
        }
    }

    #[test]
    fn full_chain_follows_documented_order() {
        let fx = tools();
        let mut wrappers = everything_enabled(&fx.custom);
        wrappers.compositor.enabled = false;

        let chain = build_wrapper_chain(&wrappers, &fx.tools);
        let order = ["/strace", "/mangohud", "/gamemoderun", "/_v2-entry-point"]
            .iter()
            .map(|suffix| program_index(&chain, suffix).expect("wrapper present"))
            .collect::<Vec<_>>();

        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(order[0], 0);
        assert_eq!(chain.tokens[1..4], ["-f", "-o", "/tmp/trace"]);
    }

    #[test]
    fn overlay_moves_inside_compositor() {
        let fx = tools();
        let wrappers = everything_enabled(&fx.custom);

        let chain = build_wrapper_chain(&wrappers, &fx.tools);
        let separator = chain.tokens.iter().position(|t| t == "--").expect("separator");
        let mangoapp = chain.tokens.iter().position(|t| t == "--mangoapp").expect("mangoapp");
        assert!(mangoapp < separator);
    }

    #[test]
    fn missing_binaries_are_skipped_with_notes() {
        let wrappers = WrapperSettings {
            custom: vec![CustomWrapper {
                executable: "/nonexistent/gantry-wrapper".to_string(),
                args: String::new(),
                enabled: true,
            }],
            sandbox_runtime: true,
            ..WrapperSettings::default()
        };

        let chain = build_wrapper_chain(&wrappers, &ToolPaths::default());
        assert!(chain.tokens.is_empty());
        assert_eq!(chain.notes.len(), 2);
    }

    #[test]
    fn gamescope_args_cover_resolution_filter_and_limits() {
        let settings = CompositorSettings {
            enabled: true,
            game_width: Some(1280),
            game_height: Some(720),
            output_width: Some(2560),
            output_height: Some(1440),
            upscale_method: "FSR".to_string(),
            window_type: WindowType::Borderless,
            fps_limit: Some(60),
            fps_limit_no_focus: Some(0),
            force_grab_cursor: true,
            additional_options: "--hdr-enabled".to_string(),
        };

        assert_eq!(
            gamescope_args(&settings, false),
            vec![
                "-w", "1280", "-h", "720", "-W", "2560", "-H", "1440", "-F", "fsr", "-b", "-r",
                "60", "--force-grab-cursor", "--hdr-enabled", "--",
            ]
        );
    }
}
