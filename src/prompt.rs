use crate::models::ProtectionMethod;
use crate::vault::validate_factor;
use anyhow::{bail, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};

/// Result of handling one key press.
#[derive(Debug, PartialEq, Eq)]
pub enum InputStep {
    Continue,
    Submit,
    Cancel,
}

/// Line editor state for a secret typed in raw mode.
#[derive(Debug, Default)]
pub struct MaskedInput {
    buffer: String,
}

impl MaskedInput {
    pub fn value(&self) -> &str {
        &self.buffer
    }

    /// Apply one key press to the buffer.
    pub fn handle(&mut self, key: KeyEvent) -> InputStep {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => InputStep::Cancel,
            KeyCode::Esc => InputStep::Cancel,
            KeyCode::Enter => InputStep::Submit,
            KeyCode::Backspace => {
                self.buffer.pop();
                InputStep::Continue
            }
            KeyCode::Char(c) => {
                self.buffer.push(c);
                InputStep::Continue
            }
            _ => InputStep::Continue,
        }
    }
}

/// Read a secret without echoing it; one `*` is shown per character.
pub fn read_secret(prompt: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;

    enable_raw_mode()?;
    let result = read_masked(&mut stdout);
    disable_raw_mode()?;
    writeln!(stdout)?;

    result
}

fn read_masked(stdout: &mut io::Stdout) -> Result<String> {
    let mut input = MaskedInput::default();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let before = input.value().chars().count();
        match input.handle(key) {
            InputStep::Submit => return Ok(input.value().to_string()),
            InputStep::Cancel => bail!("input cancelled"),
            InputStep::Continue => {
                let after = input.value().chars().count();
                if after > before {
                    write!(stdout, "*")?;
                } else if after < before {
                    write!(stdout, "\u{8} \u{8}")?;
                }
                stdout.flush()?;
            }
        }
    }
}

/// Ask for a new pin or password until it is well formed and typed the same
/// way twice.
pub fn read_new_factor(method: ProtectionMethod) -> Result<String> {
    if method == ProtectionMethod::None {
        return Ok(String::new());
    }
    let hint = match method {
        ProtectionMethod::Pin => "4 digits",
        _ => "letters and numbers only",
    };
    loop {
        let factor = read_secret(&format!("Choose a {} ({}): ", method.label(), hint))?;
        if !validate_factor(method, &factor) {
            eprintln!("That {} is not valid, try again.", method.label());
            continue;
        }
        let confirm = read_secret(&format!("Confirm {}: ", method.label()))?;
        if confirm != factor {
            eprintln!("The two entries do not match, try again.");
            continue;
        }
        return Ok(factor);
    }
}
