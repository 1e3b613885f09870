//! Concurrent draining of a command's output streams.

use bytes::Bytes;
use gypsy_core::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Drain stdout and stderr to EOF in two tasks and join both.
///
/// Reading one stream to completion before the other can deadlock once the
/// producer blocks on a full pipe.
pub async fn capture_output<O, E>(stdout: O, stderr: E) -> Result<(Bytes, Bytes)>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let out = tokio::spawn(drain(stdout));
    let err = tokio::spawn(drain(stderr));
    let (out, err) = tokio::join!(out, err);

    let out = flatten(out, "stdout")?;
    let err = flatten(err, "stderr")?;
    Ok((out, err))
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Bytes> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

fn flatten(
    joined: std::result::Result<std::io::Result<Bytes>, tokio::task::JoinError>,
    stream: &str,
) -> Result<Bytes> {
    joined
        .map_err(|e| Error::Execution(format!("{} reader panicked: {}", stream, e)))?
        .map_err(|e| Error::Execution(format!("failed to read {}: {}", stream, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_interleaved_writes_with_small_pipes() {
        let (mut out_w, out_r) = tokio::io::duplex(64);
        let (mut err_w, err_r) = tokio::io::duplex(64);

        tokio::spawn(async move {
            for i in 0..200 {
                out_w
                    .write_all(format!("out line {}\n", i).as_bytes())
                    .await
                    .unwrap();
                err_w
                    .write_all(format!("err line {}\n", i).as_bytes())
                    .await
                    .unwrap();
            }
        });

        let (out, err) = tokio::time::timeout(Duration::from_secs(5), capture_output(out_r, err_r))
            .await
            .expect("capture deadlocked")
            .unwrap();

        let out = String::from_utf8(out.to_vec()).unwrap();
        let err = String::from_utf8(err.to_vec()).unwrap();
        assert_eq!(out.lines().count(), 200);
        assert_eq!(err.lines().count(), 200);
        assert!(out.starts_with("out line 0\n"));
        assert!(err.ends_with("err line 199\n"));
    }

    #[tokio::test]
    async fn test_fast_stdout_slow_stderr() {
        let (mut out_w, out_r) = tokio::io::duplex(128);
        let (mut err_w, err_r) = tokio::io::duplex(128);

        let fast = tokio::spawn(async move {
            out_w.write_all(&vec![b'x'; 64 * 1024]).await.unwrap();
        });
        let slow = tokio::spawn(async move {
            for i in 0..5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                err_w.write_all(format!("{}", i).as_bytes()).await.unwrap();
            }
        });

        let (out, err) = capture_output(out_r, err_r).await.unwrap();
        fast.await.unwrap();
        slow.await.unwrap();

        assert_eq!(out.len(), 64 * 1024);
        assert_eq!(&err[..], b"01234");
    }

    #[tokio::test]
    async fn test_slow_stdout_fast_stderr() {
        let (mut out_w, out_r) = tokio::io::duplex(128);
        let (mut err_w, err_r) = tokio::io::duplex(128);

        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                out_w.write_all(b"tick\n").await.unwrap();
            }
        });
        tokio::spawn(async move {
            err_w.write_all(&vec![b'e'; 32 * 1024]).await.unwrap();
        });

        let (out, err) = capture_output(out_r, err_r).await.unwrap();
        assert_eq!(&out[..], b"tick\ntick\ntick\n");
        assert_eq!(err.len(), 32 * 1024);
    }

    #[tokio::test]
    async fn test_empty_streams() {
        let (out_w, out_r) = tokio::io::duplex(8);
        let (err_w, err_r) = tokio::io::duplex(8);
        drop(out_w);
        drop(err_w);

        let (out, err) = capture_output(out_r, err_r).await.unwrap();
        assert!(out.is_empty());
        assert!(err.is_empty());
    }
}
