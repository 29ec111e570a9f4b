use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{BackendStatus, ChatTransport};
use crate::config::Config;
use crate::exchange::{run_exchange, Dispatch, ExchangeState, Pipeline, Settlement, Submission};
use crate::panel::{Panel, PanelState};
use crate::transcript::Transcript;

/// Results produced off the UI loop and applied back on it.
#[derive(Debug)]
pub enum BackgroundEvent {
    Settled(Settlement),
    Health(BackendStatus),
}

/// Everything the widget owns, from mount to unmount.
pub struct App {
    pub config: Config,
    pub panel: Panel,
    pub transcript: Transcript,
    pub pipeline: Pipeline,
    pub input: String,
    pub backend_status: BackendStatus,
    pub animation_frame: usize,
    mounted: bool,
    transport: Arc<dyn ChatTransport>,
    events: UnboundedSender<BackgroundEvent>,
    cancel: CancellationToken,
}

impl App {
    pub fn new(
        config: Config,
        transport: Arc<dyn ChatTransport>,
        events: UnboundedSender<BackgroundEvent>,
    ) -> Self {
        Self {
            panel: Panel::new(config.focus_delay()),
            pipeline: Pipeline::new(config.ordering),
            transcript: Transcript::new(),
            input: String::new(),
            backend_status: BackendStatus::Unknown,
            animation_frame: 0,
            mounted: false,
            transport,
            events,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Attach the widget and probe the backend once in the background.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        info!(url = %self.config.base_url, ordering = ?self.pipeline.ordering(), "widget mounted");

        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                result = transport.health() => result,
                _ = cancel.cancelled() => return,
            };
            match &result {
                Ok(report) if report.is_ok() => info!(timestamp = ?report.timestamp, "backend healthy"),
                Ok(report) => warn!(failing = ?report.failing_components(), "backend degraded"),
                Err(err) => warn!(error = %err, "health probe failed"),
            }
            let _ = events.send(BackgroundEvent::Health(BackendStatus::from_probe(&result)));
        });
    }

    /// Detach the widget: abort in-flight and queued exchanges.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.cancel.cancel();
        let drained = self.pipeline.drain_queue(&mut self.transcript);
        info!(
            entries = self.transcript.len(),
            in_flight = self.pipeline.in_flight(),
            drained,
            "widget unmounted"
        );
    }

    pub fn toggle(&mut self) -> PanelState {
        if !self.mounted {
            return self.panel.state();
        }
        let state = self.panel.toggle(Instant::now());
        info!(?state, "panel toggled");
        state
    }

    pub fn close_panel(&mut self) {
        self.panel.close(Instant::now());
    }

    pub fn submit(&mut self) {
        if !self.mounted {
            return;
        }
        match self.pipeline.submit(&mut self.transcript, &self.input) {
            Submission::NoOp => {}
            Submission::Dispatched(dispatch) => {
                self.input.clear();
                self.dispatch(dispatch);
            }
            Submission::Queued(_) => self.input.clear(),
        }
    }

    pub fn handle_background(&mut self, event: BackgroundEvent) {
        match event {
            BackgroundEvent::Settled(settlement) => {
                let settled = self.pipeline.settle(&mut self.transcript, settlement);
                // The latest exchange says more about reachability than the mount-time probe
                match settled.state {
                    Some(ExchangeState::BotRendered) => self.backend_status = BackendStatus::Online,
                    Some(ExchangeState::NetworkErrorRendered) if self.mounted => {
                        self.backend_status = BackendStatus::Offline
                    }
                    _ => {}
                }
                if let Some(next) = settled.next {
                    self.dispatch(next);
                }
            }
            BackgroundEvent::Health(status) => self.backend_status = status,
        }
    }

    fn dispatch(&self, dispatch: Dispatch) {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let settlement = run_exchange(transport, dispatch, cancel).await;
            // The receiver is gone once the UI loop has exited
            let _ = events.send(BackgroundEvent::Settled(settlement));
        });
    }

    /// Keystrokes only reach the input once it holds focus.
    pub fn insert_text(&mut self, text: &str) {
        if !self.panel.input_focused() {
            return;
        }
        let filtered: String = text
            .chars()
            .filter(|c| *c != '\r')
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        self.input.push_str(&filtered);
    }

    pub fn backspace(&mut self) {
        if self.panel.input_focused() {
            self.input.pop();
        }
    }

    pub fn tick(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 360;
        self.panel.tick(Instant::now());
    }

    pub fn scroll_up(&mut self) {
        self.transcript.scroll_up(self.config.scroll_step);
    }

    pub fn scroll_down(&mut self) {
        self.transcript.scroll_down(self.config.scroll_step);
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, HealthReport, RequestOutcome, NETWORK_ERROR_MESSAGE};
    use crate::exchange::ExchangeOrdering;
    use crate::transcript::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    /// Answers `slow:*` queries after a delay, everything else immediately.
    #[derive(Default)]
    struct ScriptedTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(&self, query: &str) -> RequestOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match query {
                "boom" => RequestOutcome::ProtocolError("db down".to_string()),
                "offline" => RequestOutcome::network_failure(),
                "hang" => std::future::pending().await,
                q if q.starts_with("slow:") => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    RequestOutcome::Success(format!("re {q}"))
                }
                q => RequestOutcome::Success(format!("re {q}")),
            }
        }

        async fn health(&self) -> Result<HealthReport, BackendError> {
            Ok(serde_json::from_str(r#"{"status": "OK"}"#)?)
        }
    }

    fn mounted_app(
        ordering: ExchangeOrdering,
    ) -> (App, Arc<ScriptedTransport>, UnboundedReceiver<BackgroundEvent>) {
        let transport = Arc::new(ScriptedTransport::default());
        let (tx, rx) = unbounded_channel();
        let config = Config {
            focus_delay_ms: 0,
            ordering,
            ..Config::default()
        };
        let mut app = App::new(config, transport.clone(), tx);
        app.mount();
        app.toggle();
        (app, transport, rx)
    }

    async fn drain_settlements(
        app: &mut App,
        rx: &mut UnboundedReceiver<BackgroundEvent>,
        count: usize,
    ) {
        let mut settled = 0;
        while settled < count {
            let event = rx.recv().await.unwrap();
            if matches!(event, BackgroundEvent::Settled(_)) {
                settled += 1;
            }
            app.handle_background(event);
        }
    }

    #[tokio::test]
    async fn test_mount_reports_backend_health() {
        let (mut app, _, mut rx) = mounted_app(ExchangeOrdering::Concurrent);
        let event = rx.recv().await.unwrap();
        app.handle_background(event);
        assert_eq!(app.backend_status, BackendStatus::Online);
    }

    #[tokio::test]
    async fn test_blank_input_sends_nothing() {
        let (mut app, transport, _rx) = mounted_app(ExchangeOrdering::Concurrent);
        app.insert_text("    ");
        app.submit();

        tokio::task::yield_now().await;
        assert!(app.transcript.is_empty());
        assert_eq!(app.input, "    ");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_round_trip() {
        let (mut app, _, mut rx) = mounted_app(ExchangeOrdering::Concurrent);
        app.insert_text("hello");
        app.submit();

        assert!(app.input.is_empty());
        assert_eq!(app.transcript.pending_count(), 1);

        drain_settlements(&mut app, &mut rx, 1).await;

        let entries = app.transcript.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[1].role, Role::Bot);
        assert_eq!(entries[1].text, "re hello");
    }

    #[tokio::test]
    async fn test_failures_leave_widget_usable() {
        let (mut app, _, mut rx) = mounted_app(ExchangeOrdering::Concurrent);

        app.insert_text("boom");
        app.submit();
        drain_settlements(&mut app, &mut rx, 1).await;

        app.insert_text("offline");
        app.submit();
        drain_settlements(&mut app, &mut rx, 1).await;

        app.insert_text("again");
        app.submit();
        drain_settlements(&mut app, &mut rx, 1).await;

        let texts: Vec<(Role, &str)> = app
            .transcript
            .entries()
            .iter()
            .map(|e| (e.role, e.text.as_str()))
            .collect();
        assert_eq!(
            texts,
            vec![
                (Role::User, "boom"),
                (Role::Error, "db down"),
                (Role::User, "offline"),
                (Role::Error, NETWORK_ERROR_MESSAGE),
                (Role::User, "again"),
                (Role::Bot, "re again"),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_submissions_leak_no_indicator() {
        let (mut app, _, mut rx) = mounted_app(ExchangeOrdering::Concurrent);

        app.insert_text("slow:first");
        app.submit();
        app.insert_text("second");
        app.submit();
        assert_eq!(app.transcript.pending_count(), 2);

        drain_settlements(&mut app, &mut rx, 2).await;

        assert_eq!(app.transcript.pending_count(), 0);
        let bots: Vec<&str> = app
            .transcript
            .entries()
            .iter()
            .filter(|e| e.role == Role::Bot)
            .map(|e| e.text.as_str())
            .collect();
        // The quick reply overtakes the slow one
        assert_eq!(bots, vec!["re second", "re slow:first"]);
    }

    #[tokio::test]
    async fn test_serialized_submissions_render_in_order() {
        let (mut app, transport, mut rx) = mounted_app(ExchangeOrdering::Serialized);

        app.insert_text("slow:first");
        app.submit();
        app.insert_text("second");
        app.submit();

        drain_settlements(&mut app, &mut rx, 2).await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let bots: Vec<&str> = app
            .transcript
            .entries()
            .iter()
            .filter(|e| e.role == Role::Bot)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(bots, vec!["re slow:first", "re second"]);
    }

    #[tokio::test]
    async fn test_unmount_aborts_hung_exchange() {
        let (mut app, _, mut rx) = mounted_app(ExchangeOrdering::Concurrent);
        app.insert_text("hang");
        app.submit();

        app.unmount();
        drain_settlements(&mut app, &mut rx, 1).await;

        assert_eq!(app.transcript.pending_count(), 0);
        assert_eq!(app.transcript.entries()[1].text, NETWORK_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_unmount_aborts_queued_exchanges_alike() {
        let (mut app, transport, mut rx) = mounted_app(ExchangeOrdering::Serialized);
        app.insert_text("hang");
        app.submit();
        app.insert_text("queued");
        app.submit();
        assert_eq!(app.pipeline.queued(), 1);

        app.unmount();
        drain_settlements(&mut app, &mut rx, 1).await;

        // The queued query never reached the transport
        assert!(transport.calls.load(Ordering::SeqCst) <= 1);
        assert_eq!(app.transcript.pending_count(), 0);
        assert_eq!(app.pipeline.outstanding(), 0);
        let errors = app
            .transcript
            .entries()
            .iter()
            .filter(|e| e.role == Role::Error && e.text == NETWORK_ERROR_MESSAGE)
            .count();
        assert_eq!(errors, 2);
    }

    #[tokio::test]
    async fn test_unmounted_widget_ignores_triggers() {
        let (mut app, transport, _rx) = mounted_app(ExchangeOrdering::Concurrent);
        app.unmount();

        let before = app.panel.state();
        assert_eq!(app.toggle(), before);

        app.input = "hello".to_string();
        app.submit();
        assert!(app.transcript.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_typing_waits_for_focus() {
        let transport = Arc::new(ScriptedTransport::default());
        let (tx, _rx) = unbounded_channel();
        let config = Config {
            focus_delay_ms: 60_000,
            ..Config::default()
        };
        let mut app = App::new(config, transport, tx);
        app.mount();
        app.toggle();

        app.insert_text("early");
        assert!(app.input.is_empty());

        app.panel.focus_input();
        app.insert_text("line one\r\nline two");
        assert_eq!(app.input, "line one line two");
    }
}
