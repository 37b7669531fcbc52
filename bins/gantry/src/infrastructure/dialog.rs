use gantry_core::ports::DialogPort;
use gantry_core::LaunchFailure;

/// Terminal stand-in for a dialog: prints the failure on stderr.
pub struct StderrDialog;

impl DialogPort for StderrDialog {
    fn show_failure(&self, failure: &LaunchFailure) {
        eprintln!("gantry: {}", failure.kind.message());
        eprintln!("  title: {}", failure.title_id);
        eprintln!("  {}", failure.detail);
    }
}
