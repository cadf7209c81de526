use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

/// Line-oriented question/answer input for the menu.
pub struct Prompt<R> {
    lines: Lines<R>,
}

impl Prompt<BufReader<Stdin>> {
    /// Prompt reading from the process's standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Prompt<R> {
    /// Prompt reading from any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Print `label` and read one trimmed line. `None` at end of input.
    pub async fn ask(&mut self, label: &str) -> std::io::Result<Option<String>> {
        print!("{}", label);
        std::io::stdout().flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    /// Read a line, substituting `default` when it is blank.
    pub async fn ask_or(&mut self, label: &str, default: &str) -> std::io::Result<Option<String>> {
        Ok(self
            .ask(label)
            .await?
            .map(|answer| if answer.is_empty() { default.to_string() } else { answer }))
    }

    /// Yes/no question; anything but `y`/`yes` is no.
    pub async fn confirm(&mut self, label: &str) -> std::io::Result<bool> {
        Ok(self
            .ask(label)
            .await?
            .is_some_and(|a| matches!(a.to_lowercase().as_str(), "y" | "yes")))
    }
}
