//! Terminal colors for log lines, disabled when stderr isn't a terminal.
use crate::config::get_config;
use colored::{Color, Colorize};

pub trait MaybeColorize {
    /// Paint the text if logging goes to a terminal.
    fn paint(&self, color: Color) -> String;

    fn green(&self) -> String {
        self.paint(Color::Green)
    }

    fn red(&self) -> String {
        self.paint(Color::Red)
    }

    fn purple(&self) -> String {
        self.paint(Color::Magenta)
    }

    fn yellow(&self) -> String {
        self.paint(Color::Yellow)
    }
}

impl MaybeColorize for str {
    fn paint(&self, color: Color) -> String {
        if get_config().general.tty {
            self.color(color).to_string()
        } else {
            self.to_string()
        }
    }
}

impl MaybeColorize for String {
    fn paint(&self, color: Color) -> String {
        self.as_str().paint(color)
    }
}
