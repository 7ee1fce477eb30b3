//! Single-line, carriage-return-driven progress display.
//!
//! Grounded on `manager.py::display_progress`.

use std::io::Write;

use crate::yenc::sizeof_fmt;

pub fn display_progress(progress: f64, bytes_per_sec: f64, quiet: bool) {
    if quiet {
        return;
    }
    eprint!(
        "\rProgress: {:.2}%, Rate: {}          ",
        progress * 100.0,
        sizeof_fmt(bytes_per_sec)
    );
    let _ = std::io::stderr().flush();
}

pub fn finish_progress(quiet: bool) {
    if quiet {
        return;
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_mode_does_not_panic() {
        display_progress(0.5, 1000.0, true);
        finish_progress(true);
    }
}
