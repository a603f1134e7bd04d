//! Line-oriented stand-in for the camera.
//!
//! Each input line is one decoded frame. Frames read while the session is
//! validating are dropped, the same way a real camera stops delivering
//! events once validation starts.

use piscan_core::{RawScanEvent, ScanSessionState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// What the operator fed into the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraInput {
    Frame(RawScanEvent),
    Reset,
    Quit,
}

impl CameraInput {
    /// Interprets one input line.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" | ":reset" => Self::Reset,
            ":quit" | ":q" => Self::Quit,
            _ => Self::Frame(RawScanEvent::new(
                line.trim_end_matches(|c: char| c == '\r' || c == '\n'),
            )),
        }
    }
}

/// Reads `reader` line by line on a background task.
///
/// End of input is delivered as [`CameraInput::Quit`].
pub fn spawn_reader<R>(
    reader: R,
    session: watch::Receiver<ScanSessionState>,
) -> mpsc::Receiver<CameraInput>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            let input = match lines.next_line().await {
                Ok(Some(line)) => CameraInput::parse(&line),
                Ok(None) => CameraInput::Quit,
                Err(err) => {
                    debug!(error = %err, "input closed");
                    CameraInput::Quit
                }
            };

            if matches!(input, CameraInput::Frame(_)) && session.borrow().validating() {
                debug!("frame dropped while validating");
                continue;
            }

            let quit = input == CameraInput::Quit;
            if tx.send(input).await.is_err() || quit {
                break;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use piscan_core::ScanPhase;

    #[test]
    fn test_parse_line() {
        assert_eq!(CameraInput::parse(""), CameraInput::Reset);
        assert_eq!(CameraInput::parse("  :reset "), CameraInput::Reset);
        assert_eq!(CameraInput::parse(":quit"), CameraInput::Quit);
        assert_eq!(
            CameraInput::parse("ABC-123"),
            CameraInput::Frame(RawScanEvent::new("ABC-123"))
        );
        // Codes are forwarded untrimmed apart from line endings.
        assert_eq!(
            CameraInput::parse(" ABC-123\r"),
            CameraInput::Frame(RawScanEvent::new(" ABC-123"))
        );
    }

    #[tokio::test]
    async fn test_reader_delivers_lines_then_quit() {
        let (_tx, session) = watch::channel(ScanSessionState {
            phase: ScanPhase::Scanning,
            ..ScanSessionState::default()
        });
        let mut inputs = spawn_reader(&b"ABC-123\n\nXYZ-999\n"[..], session);

        assert_eq!(
            inputs.recv().await,
            Some(CameraInput::Frame(RawScanEvent::new("ABC-123")))
        );
        assert_eq!(inputs.recv().await, Some(CameraInput::Reset));
        assert_eq!(
            inputs.recv().await,
            Some(CameraInput::Frame(RawScanEvent::new("XYZ-999")))
        );
        assert_eq!(inputs.recv().await, Some(CameraInput::Quit));
        assert_eq!(inputs.recv().await, None);
    }

    #[tokio::test]
    async fn test_frames_dropped_while_validating() {
        let (_tx, session) = watch::channel(ScanSessionState {
            phase: ScanPhase::Validating,
            ..ScanSessionState::default()
        });
        let mut inputs = spawn_reader(&b"ABC-123\n:reset\n"[..], session);

        assert_eq!(inputs.recv().await, Some(CameraInput::Reset));
        assert_eq!(inputs.recv().await, Some(CameraInput::Quit));
    }
}
