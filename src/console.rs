//! Interactive read-query-respond loop

use crate::agent::FilingAgent;
use crate::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Input that ends the session
pub const EXIT_SENTINEL: &str = "exit";

/// Prompt `User: `, answer with `Agent: ...`, until `exit` or end of input
pub async fn run<R, W>(agent: &mut FilingAgent, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        writer.write_all(b"User: ").await?;
        writer.flush().await?;

        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Discarding input that is not valid UTF-8");
                writer
                    .write_all(b"Agent error: input is not valid UTF-8\n")
                    .await?;
                writer.flush().await?;
                continue;
            }
        };

        let input = line.trim();
        if input == EXIT_SENTINEL {
            break;
        }
        if input.is_empty() {
            continue;
        }

        match agent.chat(input).await {
            Ok(response) => {
                writer
                    .write_all(format!("Agent: {}\n", response.response).as_bytes())
                    .await?;
            }
            Err(e) => {
                warn!(error = %e, "Agent turn failed");
                writer
                    .write_all(format!("Agent error: {}\n", e).as_bytes())
                    .await?;
            }
        }
        writer.flush().await?;
    }

    writer.write_all(b"\n").await?;
    writer.flush().await?;
    info!("Console session ended");
    Ok(())
}
