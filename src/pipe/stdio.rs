use anyhow::Result;
use serde_json::Value;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::case::{to_camel, to_snake};

/// Which way keys are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    /// snake_case → camelCase
    Camel,
    /// camelCase → snake_case
    Snake,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PipeStats {
    pub converted: usize,
    pub passed_through: usize,
}

/// Convert newline-delimited JSON from stdin to stdout.
pub async fn run(direction: Direction) -> Result<()> {
    let stdin = BufReader::new(io::stdin());
    let mut stdout = io::stdout();

    tracing::info!("Converting keys to {:?} case, reading stdin", direction);
    let stats = convert_lines(stdin, &mut stdout, direction).await?;
    tracing::info!(
        "{} line(s) converted, {} passed through unchanged",
        stats.converted,
        stats.passed_through
    );
    Ok(())
}

/// One JSON document per line. Lines that are not JSON are written back
/// unchanged; blank lines are dropped.
pub async fn convert_lines<R, W>(reader: R, writer: &mut W, direction: Direction) -> Result<PipeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = PipeStats::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let out = match serde_json::from_str::<Value>(line) {
            Ok(json) => {
                stats.converted += 1;
                let converted = match direction {
                    Direction::Camel => to_camel(&json),
                    Direction::Snake => to_snake(&json),
                };
                serde_json::to_string(&converted)?
            }
            Err(e) => {
                tracing::warn!("Not JSON, passing through: {e}");
                stats.passed_through += 1;
                line.to_string()
            }
        };

        writer.write_all(out.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    writer.flush().await?;
    Ok(stats)
}
