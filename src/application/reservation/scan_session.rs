use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{ResourceId, scan::decode_scan_payload};

/// デコード結果チャネルの容量
const DECODED_CHANNEL_CAPACITY: usize = 8;

/// スキャンセッション
///
/// カメラ等から届く生のフレーム文字列を一定間隔でデコードし、
/// 取り出せたリソースIDを1件ずつチャネルに流す。
/// 同じIDが連続した場合は最初の1回だけ流す。
///
/// `stop()`またはドロップで終了する。セッションはコアの状態を持たないため、
/// 途中で止めても中途半端な変更は残らない。
pub struct ScanSession {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ScanSession {
    /// セッションを開始する
    ///
    /// `frames`が閉じられるか`stop()`されるまで動き続ける。
    /// 戻り値のレシーバーからデコード済みのリソースIDを受け取る。
    pub fn start(
        mut frames: mpsc::Receiver<String>,
        frame_interval: Duration,
    ) -> (Self, mpsc::Receiver<ResourceId>) {
        let (decoded_tx, decoded_rx) = mpsc::channel(DECODED_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_emitted: Option<ResourceId> = None;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }

                let frame = tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    frame = frames.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                let Ok(resource_id) = decode_scan_payload(&frame) else {
                    tracing::trace!("Frame did not decode");
                    continue;
                };
                if last_emitted.as_ref() == Some(&resource_id) {
                    continue;
                }
                last_emitted = Some(resource_id.clone());

                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    sent = decoded_tx.send(resource_id) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Scan session ended");
        });

        (
            Self {
                shutdown: Some(shutdown_tx),
                task: Some(task),
            },
            decoded_rx,
        )
    }

    /// セッションを止め、ループの終了を待つ
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
