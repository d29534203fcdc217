// This file's job is to produce the categorized user-facing console
// messages. Logging (the `log` macros) is separate and goes to the
// developer, not the user.

use std::io::Write;

use colored::{ColoredString, Colorize};

/// The fixed set of message categories, each with a distinct marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Question,
    Error,
    Success,
    Progress,
}

impl MessageKind {
    /// The plain-text marker for this kind, without color codes.
    pub fn marker(&self) -> &'static str {
        match self {
            MessageKind::Info => "[!]",
            MessageKind::Question => "[?]",
            MessageKind::Error => "[-]",
            MessageKind::Success => "[+]",
            MessageKind::Progress => "[~]",
        }
    }

    fn colored_marker(&self) -> ColoredString {
        match self {
            MessageKind::Info => self.marker().yellow(),
            MessageKind::Question => self.marker().blue(),
            MessageKind::Error => self.marker().red(),
            MessageKind::Success => self.marker().green(),
            MessageKind::Progress => self.marker().bright_white(),
        }
    }
}

/// Prints a categorized message with its colored marker and a newline.
pub fn say(kind: MessageKind, message: &str) {
    println!("{} {}", kind.colored_marker(), message);
}

/// Prints a categorized message without the trailing newline, for steps
/// that complete the line later with [`finish_line`].
pub fn say_inline(kind: MessageKind, message: &str) {
    print!("{} {}", kind.colored_marker(), message);
    // Without a newline the message would otherwise sit in the stdout
    // buffer until the step finishes.
    let _ = std::io::stdout().flush();
}

/// Completes a line started with [`say_inline`].
pub fn finish_line(message: &str) {
    println!("{message}");
}
