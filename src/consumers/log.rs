use super::{Consumer, ConsumerReport};
use crate::error::ConsumerError;
use crate::order::OrderedBatch;
use colored::Colorize;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Prints each batch as one line.
pub struct LogConsumer<W: Write> {
    out: W,
    format: LogFormat,
    color: bool,
}

impl LogConsumer<std::io::Stdout> {
    pub fn stdout(format: LogFormat, color: bool) -> Self {
        Self::new(std::io::stdout(), format).with_color(color)
    }
}

impl<W: Write> LogConsumer<W> {
    pub fn new(out: W, format: LogFormat) -> Self {
        Self {
            out,
            format,
            color: false,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&self, batch: &OrderedBatch) -> Result<String, ConsumerError> {
        match self.format {
            LogFormat::Json => {
                serde_json::to_string(batch).map_err(|e| ConsumerError::Write(e.to_string()))
            }
            LogFormat::Text => {
                let heading = "QR codes (left to right):";
                let heading = if self.color {
                    heading.bold().cyan().to_string()
                } else {
                    heading.to_string()
                };
                Ok(format!("{} {:?}", heading, batch.payloads))
            }
        }
    }
}

impl<W: Write> Consumer for LogConsumer<W> {
    fn name(&self) -> &str {
        "log"
    }

    fn consume(&mut self, batch: &OrderedBatch) -> Result<ConsumerReport, ConsumerError> {
        let line = self.render(batch)?;
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(ConsumerReport::handled(batch.len()))
    }
}
