//! The HTTP side of SSTP: recognize the handshake request, patch the
//! oversized Content-Length the client advertises, answer with the canned
//! 200 and hand the raw connection to the session loop.

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::select;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::log::log_line;
use crate::session::{run_session, SessionState};
use crate::types::SessionConfig;

/// SSTP handshake HTTP method.
pub const METHOD_SSTP: &str = "SSTP_DUPLEX_POST";

/// Well-known path the SSTP handshake uses.
pub const REQUEST_PATH: &str = "/sra_{BA195980-CD49-458b-9E23-C84EE0ADCD75}/";

/// What the client sends: 2^64-1, larger than any signed length type.
pub const CONTENT_LENGTH_HUGE: &[u8] = b"Content-Length: 18446744073709551615";

/// What we patch it to: 2^63-1, padded to the same byte length.
pub const CONTENT_LENGTH_PATCHED: &[u8] = b"Content-Length: 9223372036854775807 ";

/// The response the SSTP client expects, verbatim.
const RESPONSE_OK: &[u8] = b"HTTP/1.1 200 OK\r\n\
Date: Thu, 09 Nov 2006 00:51:09 GMT\r\n\
Server: Microsoft-HTTPAPI/2.0\r\n\
Content-Length: 18446744073709551615\r\n\
\r\n";

const RESPONSE_NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";

const RESPONSE_BAD_VERSION: &[u8] =
    b"HTTP/1.1 505 HTTP Version Not Supported\r\nContent-Length: 0\r\n\r\n";

const MAX_HANDSHAKE_BYTES: usize = 8192;

/// Rewrite the advertised Content-Length in place. Length-preserving and
/// one-shot: the flag stops a second patch on the same connection.
pub fn patch_content_length(buf: &mut [u8], already_patched: &mut bool) -> bool {
    if *already_patched {
        return false;
    }
    let Some(index) = find_subsequence(buf, CONTENT_LENGTH_HUGE) else {
        return false;
    };
    buf[index..index + CONTENT_LENGTH_PATCHED.len()].copy_from_slice(CONTENT_LENGTH_PATCHED);
    *already_patched = true;
    true
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Handle one freshly accepted connection: read the HTTP request head,
/// decide whether it is SSTP, and either run a session over the hijacked
/// stream or answer with a plain error and close.
pub async fn serve_connection(
    mut stream: TcpStream,
    config: SessionConfig,
    cancel: CancellationToken,
) -> Result<()> {
    log_line(&format!("Session {:?}", SessionState::Handshaking));

    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let mut patched = false;
    let head_end = loop {
        let read = select! {
            _ = cancel.cancelled() => return Ok(()),
            r = stream.read(&mut chunk) => r?,
        };
        if read == 0 {
            anyhow::bail!("connection closed during HTTP handshake");
        }
        buf.extend_from_slice(&chunk[..read]);
        patch_content_length(&mut buf, &mut patched);
        if let Some(position) = find_subsequence(&buf, b"\r\n\r\n") {
            break position + 4;
        }
        if buf.len() > MAX_HANDSHAKE_BYTES {
            anyhow::bail!("HTTP handshake too large");
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");
    let version = parts.next().unwrap_or("");

    if method != METHOD_SSTP || path != REQUEST_PATH {
        log_line(&format!("Got a request: {method} {path}"));
        stream.write_all(RESPONSE_NOT_FOUND).await?;
        return Ok(());
    }
    if !version.starts_with("HTTP/1.") {
        // No HTTP/2 here
        stream.write_all(RESPONSE_BAD_VERSION).await?;
        anyhow::bail!("unsupported HTTP version: {version}");
    }

    log_line("Got a sstp request");
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("SSTPCORRELATIONID") {
                let value = value.trim().trim_start_matches('{').trim_end_matches('}');
                match Uuid::parse_str(value) {
                    Ok(id) => log_line(&format!("Correlation id {id}")),
                    Err(_) => log_line(&format!("Unparseable correlation id {value:?}")),
                }
            }
        }
    }

    stream.write_all(RESPONSE_OK).await?;
    // Anything buffered past the request head is ahead of protocol; the
    // client only talks again once it has seen the 200.
    run_session(stream, config, cancel).await
}
