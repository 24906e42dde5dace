//! Per-task ANSI color tags for mirrored console output.
//!
//! Colors are purely cosmetic: they only ever reach the live console so a
//! human can attribute interleaved lines to tasks. Archived logs never
//! contain escape codes.

use std::io::IsTerminal;

const RESET: &str = "\x1b[0m";

/// One ANSI foreground color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(&'static str);

impl Color {
    /// Wrap `text` in this color's escape codes.
    pub fn paint(&self, text: &str) -> String {
        format!("{}{}{}", self.0, text, RESET)
    }
}

/// The colors tasks cycle through, in assignment order.
pub const PALETTE: [Color; 5] = [
    Color("\x1b[32m"), // green
    Color("\x1b[33m"), // yellow
    Color("\x1b[34m"), // blue
    Color("\x1b[35m"), // magenta
    Color("\x1b[36m"), // cyan
];

/// Color for the task with the given creation index.
pub fn color_for(index: usize) -> Color {
    PALETTE[index % PALETTE.len()]
}

/// Whether color output should be used at all.
pub fn stdout_supports_color() -> bool {
    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_wraps_with_reset() {
        let painted = PALETTE[0].paint("hello");
        assert!(painted.starts_with("\x1b[32m"));
        assert!(painted.ends_with(RESET));
        assert!(painted.contains("hello"));
    }

    #[test]
    fn color_assignment_cycles_deterministically() {
        assert_eq!(color_for(0), color_for(PALETTE.len()));
        assert_eq!(color_for(2), color_for(2));
        assert_ne!(color_for(0), color_for(1));
    }
}
