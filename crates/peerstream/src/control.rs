//! Operator input

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use torrent::FileSelector;

fn is_pause_toggle(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("p")
}

/// Toggle the download on every `p` line read from `input`
pub async fn watch_input<R>(input: R, selector: Arc<FileSelector>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_pause_toggle(&line) => match selector.toggle_pause().await {
                Ok(true) => tracing::info!("Paused, type p and Enter to continue"),
                Ok(false) => tracing::info!("Resumed"),
                Err(e) => tracing::warn!("Failed to toggle download: {}", e),
            },
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Stopped reading input: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrent::memory::EngineCall;
    use torrent::{MemoryEngine, SwarmEngine};

    #[test]
    fn test_pause_toggle() {
        assert!(is_pause_toggle("p"));
        assert!(is_pause_toggle(" P \r"));
        assert!(!is_pause_toggle("pause"));
        assert!(!is_pause_toggle(""));
    }

    #[tokio::test]
    async fn test_input_toggles_primary() {
        let engine = Arc::new(
            MemoryEngine::builder()
                .file("small.txt", vec![0u8; 1])
                .file("movie.mkv", vec![0u8; 9])
                .build(),
        );
        let selector = Arc::new(FileSelector::new(engine.clone()));
        selector.resolve(None).await.unwrap();

        watch_input(&b"x\np\n\np\np\n"[..], selector.clone()).await;

        assert!(selector.is_paused());
        assert!(!engine.files()[1].selected);
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::Select(1),
                EngineCall::Deselect(1),
                EngineCall::Select(1),
                EngineCall::Deselect(1),
            ]
        );
    }
}
