// ABOUTME: Tmux pane capture arguments and cleanup of captured text
//
// Captures are taken without escape sequences, but programs that redraw
// with raw cursor movement still leak control codes into the output, so
// everything is stripped again before classification.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// CSI sequences (colors, cursor movement, erase) and OSC sequences
    /// terminated by BEL or ST.
    static ref ANSI_REGEX: Regex =
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)")
            .expect("ANSI pattern is valid");
}

/// Arguments for `tmux capture-pane` of the visible area of one pane.
pub fn capture_args(target: &str) -> Vec<String> {
    vec![
        "capture-pane".to_string(),
        "-p".to_string(), // print to stdout
        "-J".to_string(), // join wrapped lines
        "-t".to_string(),
        target.to_string(),
    ]
}

pub fn strip_ansi_codes(text: &str) -> String {
    ANSI_REGEX.replace_all(text, "").into_owned()
}

/// Strip escapes, carriage returns and trailing whitespace-only lines.
///
/// tmux pads a capture with blank rows below the cursor. Leaving them in
/// would make the "last line" of an idle shell an empty string.
pub fn clean_capture(raw: &str) -> String {
    let stripped = strip_ansi_codes(raw).replace('\r', "");
    let lines: Vec<&str> = stripped.lines().map(str::trim_end).collect();
    let keep = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(0, |idx| idx + 1);

    lines[..keep].join("\n")
}
