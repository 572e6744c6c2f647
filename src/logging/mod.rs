//! Optional file sink for `env_logger` output.
//!
//! Log lines are handed to an unbounded channel by the logger and appended to
//! the configured file by a pingora service, so request handling never waits
//! on disk I/O.

use std::io::{self, Write};

use async_trait::async_trait;
use env_logger::Builder;
use log::LevelFilter;
use pingora::{
    server::{ListenFds, ShutdownWatch},
    services::Service,
};
use tokio::{
    fs::{create_dir_all, OpenOptions},
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::config;

/// `io::Write` end of the log channel, installed as the `env_logger` target.
pub struct ChannelWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .send(buf.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    pub fn writer(&self) -> ChannelWriter {
        ChannelWriter {
            sender: self.sender.clone(),
        }
    }

    /// Routes `env_logger` into the channel. `RUST_LOG` still overrides the
    /// default `info` level.
    pub fn init_env_logger(&self) {
        Builder::new()
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .target(env_logger::Target::Pipe(Box::new(self.writer())))
            .init();
    }

    async fn open_log_file(&self) -> io::Result<BufWriter<tokio::fs::File>> {
        let path = std::path::Path::new(&self.config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;
        Ok(BufWriter::new(file))
    }

    /// Appends channel contents to `file` until shutdown or until every
    /// sender is gone.
    async fn drain<W>(&mut self, file: &mut W, shutdown: &mut ShutdownWatch)
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },

                data = self.receiver.recv() => match data {
                    Some(data) => {
                        if let Err(e) = file.write_all(&data).await {
                            eprintln!("Failed to write to log file: {e}");
                        }
                        // keep lines visible to tail -f without flushing per write
                        if self.receiver.is_empty() {
                            if let Err(e) = file.flush().await {
                                eprintln!("Failed to flush log file: {e}");
                            }
                        }
                    }
                    None => break,
                },
            }
        }

        // whatever was queued before shutdown still lands in the file
        while let Ok(data) = self.receiver.try_recv() {
            if file.write_all(&data).await.is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl Service for Logger {
    async fn start_service(&mut self, _fds: Option<ListenFds>, mut shutdown: ShutdownWatch) {
        let mut file = match self.open_log_file().await {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", self.config.path);
                return;
            }
        };

        self.drain(&mut file, &mut shutdown).await;

        if let Err(e) = file.flush().await {
            eprintln!("Failed to flush log file: {e}");
        }
    }

    fn name(&self) -> &'static str {
        "log sink"
    }

    fn threads(&self) -> Option<usize> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };

    use tokio::sync::watch;

    use super::*;

    /// Accepts writes, fails every flush.
    #[derive(Default)]
    struct FlushFails {
        written: Vec<u8>,
        flushes: usize,
    }

    impl AsyncWrite for FlushFails {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.flushes += 1;
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn logger() -> Logger {
        Logger::new(config::Log {
            path: "unused.log".to_string(),
        })
    }

    #[tokio::test]
    async fn test_drain_until_senders_gone() {
        let mut logger = logger();
        let mut writer = logger.writer();
        writer.write_all(b"first\n").unwrap();
        writer.write_all(b"second\n").unwrap();
        drop(writer);

        // the logger holds a sender of its own; swap it out so the channel closes
        let (sender, _) = unbounded_channel();
        logger.sender = sender;

        let (_tx, mut shutdown) = watch::channel(false);
        let mut sink = Vec::new();
        logger.drain(&mut sink, &mut shutdown).await;
        assert_eq!(sink, b"first\nsecond\n");
    }

    #[tokio::test]
    async fn test_drain_flushes_queue_on_shutdown() {
        let mut logger = logger();
        let mut writer = logger.writer();
        writer.write_all(b"queued\n").unwrap();

        let (tx, mut shutdown) = watch::channel(false);
        tx.send(true).unwrap();

        let mut sink = Vec::new();
        logger.drain(&mut sink, &mut shutdown).await;
        assert_eq!(sink, b"queued\n");
    }

    #[tokio::test]
    async fn test_drain_survives_flush_errors() {
        let mut logger = logger();
        let mut writer = logger.writer();
        writer.write_all(b"one\n").unwrap();
        drop(writer);

        let (sender, _) = unbounded_channel();
        logger.sender = sender;

        let (_tx, mut shutdown) = watch::channel(false);
        let mut sink = FlushFails::default();
        logger.drain(&mut sink, &mut shutdown).await;
        assert_eq!(sink.written, b"one\n");
        assert_eq!(sink.flushes, 1);
    }
}
