//! Wire framing for the request server: newline-framed JSON over TCP. This
//! crate only knows about bytes and newlines — `pipeline` owns the JSON
//! shapes carried inside each frame.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Upper bound on one incoming request line, mirroring a fixed receive
/// buffer sized against non-blocking reads.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Sent once per accepted connection before the read loop starts.
pub fn welcome_frame() -> String {
    "{\"status\":\"success\",\"message\":\"connected\"}\n".to_string()
}

/// Sent and the socket closed immediately when the worker pool is at
/// capacity.
pub fn over_capacity_frame() -> String {
    "{\"status\":\"error\",\"message\":\"server at capacity\"}\n".to_string()
}

pub fn line_too_long_frame() -> String {
    "{\"status\":\"error\",\"message\":\"request exceeds maximum message size\"}\n".to_string()
}

/// Reads one newline-terminated request from `reader`. Returns `Ok(None)`
/// on a clean EOF (zero-length read), `Ok(Some(line))` with the newline
/// stripped, or `Err` if the line exceeds `MAX_BUFFER_SIZE`.
pub async fn read_frame<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<String>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = String::new();
    let mut limited = reader.take(MAX_BUFFER_SIZE as u64 + 1);
    let n = limited.read_line(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.len() > MAX_BUFFER_SIZE || !buf.ends_with('\n') {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "request exceeds maximum message size",
        ));
    }
    while buf.ends_with('\n') || buf.ends_with('\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

/// Writes one newline-terminated response frame and flushes it.
pub async fn write_frame<W>(writer: &mut W, frame: &str) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader as TokioBufReader;

    #[tokio::test]
    async fn reads_one_line_at_a_time() {
        let data = b"{\"command\":\"ping\"}\n{\"command\":\"pong\"}\n".to_vec();
        let mut reader = TokioBufReader::new(&data[..]);
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some("{\"command\":\"ping\"}"));
        assert_eq!(read_frame(&mut reader).await.unwrap().as_deref(), Some("{\"command\":\"pong\"}"));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_stream_is_a_clean_eof() {
        let data: Vec<u8> = Vec::new();
        let mut reader = TokioBufReader::new(&data[..]);
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let mut data = vec![b'a'; MAX_BUFFER_SIZE + 10];
        data.push(b'\n');
        let mut reader = TokioBufReader::new(&data[..]);
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn write_frame_appends_nothing_extra() {
        let mut out = Vec::new();
        write_frame(&mut out, "{\"status\":\"success\"}\n").await.unwrap();
        assert_eq!(out, b"{\"status\":\"success\"}\n");
    }
}
