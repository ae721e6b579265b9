//! Stdio transport: one session per stream, messages handled in order.

use crate::codec::{self, Framing};
use crate::error::PARSE_ERROR;
use crate::protocol::{JsonRpcResponse, ProtocolRouter, RpcError, SessionState};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Serve `router` until `reader` reaches EOF.
pub async fn serve<R, W>(router: &ProtocolRouter, reader: &mut R, writer: &mut W, framing: Framing) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = SessionState::default();
    info!(server = %router.options().server_name, ?framing, "serving on stdio");

    while let Some(raw) = codec::read_message(reader, framing).await? {
        let incoming: Value = match serde_json::from_slice(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparseable message");
                let resp = JsonRpcResponse::failure(
                    Value::Null,
                    RpcError {
                        code: PARSE_ERROR,
                        message: format!("Parse error: {e}"),
                        data: None,
                    },
                );
                codec::write_message(writer, framing, &resp).await?;
                continue;
            }
        };

        if let Some(reply) = router.handle_message(incoming, &mut session).await {
            codec::write_message(writer, framing, &reply).await?;
        }
    }

    debug!("input closed");
    Ok(())
}

/// Serve on the process's stdin/stdout.
pub async fn serve_stdio(router: &ProtocolRouter, framing: Framing) -> anyhow::Result<()> {
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    serve(router, &mut stdin, &mut stdout, framing).await
}
