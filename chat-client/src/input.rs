//! Parsing of lines typed into the terminal client.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

#[derive(Debug, PartialEq, Eq)]
pub enum UserInput {
    Text(String),
    Image(PathBuf),
    Quit,
    Empty,
}

impl UserInput {
    /// Plain lines become text messages; `/image <path>` and `/quit` are
    /// commands. Unknown `/commands` are rejected instead of being sent.
    pub fn parse(line: &str) -> Result<Self> {
        let text = line.trim_end_matches(['\r', '\n']);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(UserInput::Empty);
        }

        let Some(command) = trimmed.strip_prefix('/') else {
            return Ok(UserInput::Text(text.to_string()));
        };

        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (command, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "quit" => Ok(UserInput::Quit),
            "image" if argument.is_empty() => Err(anyhow!("usage: /image <path>")),
            "image" => Ok(UserInput::Image(PathBuf::from(argument))),
            other => Err(anyhow!("unknown command '/{other}'")),
        }
    }
}

/// Lower-cased file extension, or `bin` when the path has none.
pub fn image_extension(path: &Path) -> String {
    path.extension()
        .and_then(|extension| extension.to_str())
        .filter(|extension| !extension.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_text() {
        assert_eq!(
            UserInput::parse("hello there\n").unwrap(),
            UserInput::Text("hello there".into())
        );
        assert_eq!(
            UserInput::parse("  indented\r\n").unwrap(),
            UserInput::Text("  indented".into())
        );
    }

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(UserInput::parse("").unwrap(), UserInput::Empty);
        assert_eq!(UserInput::parse("   \n").unwrap(), UserInput::Empty);
    }

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(UserInput::parse("/quit").unwrap(), UserInput::Quit);
        assert_eq!(UserInput::parse("/QUIT\n").unwrap(), UserInput::Quit);
        assert_eq!(
            UserInput::parse("/Image ./cat picture.PNG").unwrap(),
            UserInput::Image(PathBuf::from("./cat picture.PNG"))
        );
    }

    #[test]
    fn bad_commands_are_rejected() {
        assert!(UserInput::parse("/image").is_err());
        assert!(UserInput::parse("/image   ").is_err());
        assert!(UserInput::parse("/nick bob").is_err());
    }

    #[test]
    fn extension_is_normalized() {
        assert_eq!(image_extension(Path::new("cat.PNG")), "png");
        assert_eq!(image_extension(Path::new("dir/photo.jpeg")), "jpeg");
        assert_eq!(image_extension(Path::new("noext")), "bin");
    }
}
