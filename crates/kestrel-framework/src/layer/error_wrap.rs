//! Per-interaction failure reporting.
//!
//! [`ErrorWrapLayer`] turns a failed or panicking interaction pipeline into a
//! user-visible error report carrying a short correlation id, then reports
//! success so the dispatch adapter sees a handled event.
//!
//! The report is delivered best effort, walking the interaction's response
//! state machine:
//!
//! ```text
//!   respond(ephemeral report)
//!     ├─ ok ─────────────────────────────▶ done
//!     └─ already acknowledged
//!          └─ original_response()
//!               ├─ loading (deferred) ──▶ edit_response(report)
//!               └─ answered ────────────▶ send_followup(report)
//! ```
//!
//! A panic in the wrapped pipeline produces the *fatal* variant, which shows
//! no inner message. With [`attach_stack_trace`](ErrorWrapLayer::attach_stack_trace)
//! enabled, the captured backtrace is additionally sent as `st-<id>.txt`.
//!
//! The layer also owns the dispatch deadline carried by the
//! [`EventContext`]. A pipeline still running when it passes is cancelled and
//! reported as exceeding it, unless the interaction was already acknowledged:
//! a deferred pipeline keeps running for up to the
//! [`deferred_window`](ErrorWrapLayer::deferred_window) before the same
//! happens.
//!
//! Delivery failures are logged and never retried.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use nanoid::nanoid;
use tower::{BoxError, Layer, Service};
use tracing::{debug, error, warn};

use kestrel_core::{
    Attachment, Embed, Followup, Identifier, InteractionCreate, InteractionId, InteractionKind,
    InteractionResponse, ResponseData, ResponseEdit, SessionHandle, colors,
};

use crate::context::{EventContext, EventRequest};
use crate::error::{EventResult, FrameworkError};
use crate::fault::{Fault, catch_fault};

const ERROR_TITLE: &str = "Oh no! :(";
const FATAL_TITLE: &str = "Fatal! -w-";
const ERROR_FOOTER: &str = "The following error was reported!";
const DEFAULT_CONTACT: &str = "the bot operator";
const CORRELATION_ID_LEN: usize = 10;

/// Lifetime of an interaction token once acknowledged.
pub const DEFERRED_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Wraps interaction pipelines with error reporting.
#[derive(Debug, Clone)]
pub struct ErrorWrapLayer {
    tag: Identifier,
    attach_stack_trace: bool,
    contact: Option<String>,
    deferred_window: Duration,
}

impl ErrorWrapLayer {
    pub fn new(tag: Identifier) -> Self {
        Self {
            tag,
            attach_stack_trace: false,
            contact: None,
            deferred_window: DEFERRED_WINDOW,
        }
    }

    /// How long an acknowledged interaction may keep running past the
    /// context deadline (default: [`DEFERRED_WINDOW`]).
    pub fn deferred_window(mut self, window: Duration) -> Self {
        self.deferred_window = window;
        self
    }

    /// Attach the backtrace of a fatal fault as a text file (default: `false`).
    pub fn attach_stack_trace(mut self, enabled: bool) -> Self {
        self.attach_stack_trace = enabled;
        self
    }

    /// Who users should contact when errors keep happening.
    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    fn contact_line(&self) -> String {
        format!(
            "If this keeps happening contact {}.",
            self.contact.as_deref().unwrap_or(DEFAULT_CONTACT)
        )
    }

    fn embed(&self, report: &Report) -> Embed {
        let server_time = format!("<t:{}:f>", report.at.timestamp());
        let error_id = format!("`{}`", report.correlation_id);
        match &report.failure {
            Failure::Error(message) => Embed::new()
                .title(ERROR_TITLE)
                .description(format!(
                    "Sorry! An unexpected error occurred while executing this event.\n{}",
                    self.contact_line()
                ))
                .color(colors::ERROR)
                .field("Error Message", format!("```{message}```"), false)
                .field("Error ID", error_id, true)
                .field("Server Time", server_time, true)
                .footer(ERROR_FOOTER)
                .timestamp(report.at),
            Failure::Fatal(_) => Embed::new()
                .title(FATAL_TITLE)
                .description(format!(
                    "You have encountered a fatal error! This should never happen.\n{}",
                    self.contact_line()
                ))
                .color(colors::ERROR)
                .field("Error ID", error_id, true)
                .field("Server Time", server_time, true)
                .timestamp(report.at),
        }
    }

    fn trace_file(&self, report: &Report) -> Option<Attachment> {
        match &report.failure {
            Failure::Fatal(fault) if self.attach_stack_trace => Some(Attachment::text(
                format!("st-{}.txt", report.correlation_id),
                format!("{fault}\n\n{}", fault.backtrace),
            )),
            _ => None,
        }
    }

    /// Drives the wrapped pipeline against the context's deadline and
    /// cancellation token.
    async fn supervise(
        &self,
        ctx: &EventContext,
        session: &SessionHandle,
        interaction: &InteractionId,
        mut call: BoxFuture<'static, Result<EventResult, Fault>>,
    ) -> Result<(), Failure> {
        let Some(window) = ctx.remaining() else {
            return settle(call.await);
        };
        let token = ctx.cancellation_token();

        tokio::select! {
            outcome = &mut call => return settle(outcome),
            () = token.cancelled() => return Err(Failure::error(FrameworkError::Cancelled)),
            () = tokio::time::sleep(window) => {}
        }

        let mut waited = window;
        if session.original_response(interaction).await.is_ok() {
            debug!(
                identifier = %self.tag,
                window_ms = self.deferred_window.as_millis() as u64,
                "interaction acknowledged, extending deadline"
            );
            tokio::select! {
                outcome = &mut call => return settle(outcome),
                () = token.cancelled() => return Err(Failure::error(FrameworkError::Cancelled)),
                () = tokio::time::sleep(self.deferred_window) => {}
            }
            waited += self.deferred_window;
        }

        token.cancel();
        drop(call);
        Err(Failure::error(FrameworkError::DeadlineExceeded {
            timeout_ms: waited.as_millis() as u64,
        }))
    }

    async fn deliver(&self, session: &SessionHandle, interaction: &InteractionId, report: &Report) {
        let embed = self.embed(report);
        let trace = self.trace_file(report);
        let id = &report.correlation_id;

        let initial = InteractionResponse::message(ResponseData::embed(embed.clone()).ephemeral(true));
        match session.respond(interaction, initial).await {
            Ok(()) => {
                debug!(correlation_id = %id, "error report sent as reply");
                self.send_trace(session, interaction, trace, id).await;
                return;
            }
            Err(err) if err.is_already_acknowledged() => {}
            Err(err) => {
                error!(correlation_id = %id, error = %err, "failed to reply with error report");
                return;
            }
        }

        let existing = match session.original_response(interaction).await {
            Ok(existing) => existing,
            Err(err) => {
                error!(correlation_id = %id, error = %err, "failed to read existing response");
                return;
            }
        };

        if existing.flags.loading {
            match session
                .edit_response(interaction, ResponseEdit::embeds(vec![embed]))
                .await
            {
                Ok(_) => {
                    debug!(correlation_id = %id, "deferred response edited with error report");
                    self.send_trace(session, interaction, trace, id).await;
                }
                Err(err) => {
                    error!(correlation_id = %id, error = %err, "failed to edit response with error report");
                }
            }
            return;
        }

        let mut followup = Followup::embed(embed).ephemeral(true);
        if let Some(file) = trace {
            followup = followup.file(file);
        }
        match session.send_followup(interaction, followup).await {
            Ok(_) => debug!(correlation_id = %id, "error report sent as follow-up"),
            Err(err) => {
                error!(correlation_id = %id, error = %err, "failed to send error report follow-up");
            }
        }
    }

    async fn send_trace(
        &self,
        session: &SessionHandle,
        interaction: &InteractionId,
        trace: Option<Attachment>,
        id: &str,
    ) {
        let Some(file) = trace else {
            return;
        };
        let followup = Followup::default().file(file).ephemeral(true);
        if let Err(err) = session.send_followup(interaction, followup).await {
            error!(correlation_id = %id, error = %err, "failed to send stack trace");
        }
    }
}

impl<S> Layer<S> for ErrorWrapLayer {
    type Service = ErrorWrapService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorWrapService {
            layer: Arc::new(self.clone()),
            inner,
        }
    }
}

enum Failure {
    Error(String),
    Fatal(Fault),
}

impl Failure {
    fn error(err: impl ToString) -> Self {
        Self::Error(err.to_string())
    }
}

fn settle(outcome: Result<EventResult, Fault>) -> Result<(), Failure> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Failure::error(err)),
        Err(fault) => Err(Failure::Fatal(fault)),
    }
}

struct Report {
    correlation_id: String,
    at: DateTime<Utc>,
    failure: Failure,
}

/// The [`Service`] produced by [`ErrorWrapLayer`].
#[derive(Debug, Clone)]
pub struct ErrorWrapService<S> {
    layer: Arc<ErrorWrapLayer>,
    inner: S,
}

impl<S> Service<EventRequest<InteractionCreate>> for ErrorWrapService<S>
where
    S: Service<EventRequest<InteractionCreate>, Response = (), Error = BoxError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EventRequest<InteractionCreate>) -> Self::Future {
        let layer = Arc::clone(&self.layer);
        let mut inner = self.inner.clone();

        async move {
            let session = Arc::clone(&req.session);
            let event = Arc::clone(&req.event);
            let ctx = req.ctx.clone();

            let call = catch_fault(async move { inner.call(req).await }).boxed();
            let Err(failure) = layer.supervise(&ctx, &session, &event.id, call).await else {
                return Ok(());
            };
            let report = Report {
                correlation_id: nanoid!(CORRELATION_ID_LEN),
                at: Utc::now(),
                failure,
            };

            match &report.failure {
                Failure::Error(message) => error!(
                    identifier = %layer.tag,
                    correlation_id = %report.correlation_id,
                    error = %message,
                    "error while executing event"
                ),
                Failure::Fatal(fault) => error!(
                    identifier = %layer.tag,
                    correlation_id = %report.correlation_id,
                    panic = %fault.message,
                    location = fault.location.as_deref().unwrap_or("unknown"),
                    backtrace = %fault.backtrace,
                    "fatal fault while executing event"
                ),
            }

            if event.kind == InteractionKind::Autocomplete {
                warn!(
                    correlation_id = %report.correlation_id,
                    "autocomplete interactions cannot carry an error report"
                );
                return Ok(());
            }

            layer.deliver(&session, &event.id, &report).await;
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kestrel_core::{
        ChannelId, CommandData, GuildId, Interaction, MemorySession, SessionError, SessionOp,
        User, UserId,
    };

    use crate::dispatch::{DispatchAdapter, DispatchOutcome};
    use crate::handler::EventFunc;
    use crate::middleware::compose;
    use crate::test_support::capture_logs;

    fn interaction(kind: InteractionKind) -> Arc<InteractionCreate> {
        Arc::new(InteractionCreate(Interaction {
            id: InteractionId::new("i1"),
            kind,
            guild_id: Some(GuildId::new("g1")),
            channel_id: ChannelId::new("c1"),
            user: User {
                id: UserId::new("u1"),
                username: "tester".into(),
                bot: false,
            },
            data: CommandData {
                name: "error-test".into(),
                options: vec![],
            },
        }))
    }

    fn wrapped(handler: EventFunc<InteractionCreate>, layer: ErrorWrapLayer) -> EventFunc<InteractionCreate> {
        compose(handler, [crate::middleware::Middleware::from_layer(layer)])
    }

    fn tag() -> Identifier {
        Identifier::from_static("test", "error-wrap")
    }

    async fn run(
        handler: EventFunc<InteractionCreate>,
        layer: ErrorWrapLayer,
    ) -> (Arc<MemorySession>, crate::error::EventResult) {
        let session = Arc::new(MemorySession::default());
        let req = EventRequest::new(session.clone(), interaction(InteractionKind::Command));
        let result = wrapped(handler, layer).call(req).await;
        (session, result)
    }

    #[tokio::test]
    async fn test_unanswered_error_becomes_ephemeral_reply() {
        let handler = EventFunc::new(|_| async { Err("page must be > 0".into()) });
        let (session, result) = run(handler, ErrorWrapLayer::new(tag())).await;

        assert!(result.is_ok());
        let response = session.response(&InteractionId::new("i1")).unwrap();
        assert!(response.flags.ephemeral);
        let embed = &response.embeds[0];
        assert_eq!(embed.title.as_deref(), Some(ERROR_TITLE));
        assert!(embed.field_value("Error Message").unwrap().contains("page must be > 0"));
        assert!(embed.field_value("Error ID").is_some());
        assert!(embed.field_value("Server Time").unwrap().starts_with("<t:"));
        assert_eq!(session.count(SessionOp::SendFollowup), 0);
    }

    #[tokio::test]
    async fn test_deferred_response_is_edited_not_followed_up() {
        let handler = EventFunc::new(|req: EventRequest<InteractionCreate>| async move {
            req.session
                .respond(&req.event.id, InteractionResponse::deferred(true))
                .await?;
            Err("user already whitelisted".into())
        });
        let (session, result) = run(handler, ErrorWrapLayer::new(tag())).await;

        assert!(result.is_ok());
        assert_eq!(session.count(SessionOp::Respond), 2);
        assert_eq!(session.count(SessionOp::OriginalResponse), 1);
        assert_eq!(session.count(SessionOp::EditResponse), 1);
        assert_eq!(session.count(SessionOp::SendFollowup), 0);

        let response = session.response(&InteractionId::new("i1")).unwrap();
        assert!(!response.flags.loading);
        assert_eq!(response.embeds[0].title.as_deref(), Some(ERROR_TITLE));
    }

    #[tokio::test]
    async fn test_answered_response_gets_followup() {
        let handler = EventFunc::new(|req: EventRequest<InteractionCreate>| async move {
            req.session
                .respond(
                    &req.event.id,
                    InteractionResponse::message(ResponseData::content("working on it")),
                )
                .await?;
            Err("something broke later".into())
        });
        let (session, _) = run(handler, ErrorWrapLayer::new(tag())).await;

        assert_eq!(session.count(SessionOp::EditResponse), 0);
        let followups = session.followups(&InteractionId::new("i1"));
        assert_eq!(followups.len(), 1);
        assert!(followups[0].ephemeral);
        assert_eq!(followups[0].embeds[0].title.as_deref(), Some(ERROR_TITLE));
    }

    #[tokio::test]
    async fn test_panic_produces_fatal_report_with_trace() {
        let handler = EventFunc::new(|_| async {
            let empty: Vec<u8> = Vec::new();
            let _ = empty[3];
            Ok(())
        });
        let layer = ErrorWrapLayer::new(tag()).attach_stack_trace(true).contact("@ops");
        let (session, result) = run(handler, layer).await;

        assert!(result.is_ok());
        let response = session.response(&InteractionId::new("i1")).unwrap();
        let embed = &response.embeds[0];
        assert_eq!(embed.title.as_deref(), Some(FATAL_TITLE));
        assert!(embed.field_value("Error Message").is_none());
        assert!(embed.description.as_deref().unwrap().contains("@ops"));

        let followups = session.followups(&InteractionId::new("i1"));
        assert_eq!(followups.len(), 1);
        let file = &followups[0].files[0];
        let id = embed.field_value("Error ID").unwrap().trim_matches('`');
        assert_eq!(file.name, format!("st-{id}.txt"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let session = Arc::new(MemorySession::default());
        session.fail_next_with(SessionOp::Respond, SessionError::Forbidden("no access".into()));
        let handler = EventFunc::new(|_| async { Err("boom".into()) });
        let req = EventRequest::new(session.clone(), interaction(InteractionKind::Command));

        let result = wrapped(handler, ErrorWrapLayer::new(tag())).call(req).await;
        assert!(result.is_ok());
        assert_eq!(session.count(SessionOp::OriginalResponse), 0);
        assert!(session.response(&InteractionId::new("i1")).is_none());
    }

    #[tokio::test]
    async fn test_autocomplete_failure_is_logged_only() {
        let session = Arc::new(MemorySession::default());
        let handler = EventFunc::new(|_| async { Err("no choices".into()) });
        let req = EventRequest::new(session.clone(), interaction(InteractionKind::Autocomplete));

        assert!(wrapped(handler, ErrorWrapLayer::new(tag())).call(req).await.is_ok());
        assert!(session.calls().is_empty());
    }

    fn slow_handler(defer: bool) -> EventFunc<InteractionCreate> {
        EventFunc::new(move |req: EventRequest<InteractionCreate>| async move {
            if defer {
                req.session
                    .respond(&req.event.id, InteractionResponse::deferred(true))
                    .await?;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_deferred_overrun_edits_loading_response() {
        let session = Arc::new(MemorySession::default());
        let layer = ErrorWrapLayer::new(tag()).deferred_window(Duration::from_millis(30));
        let adapter = DispatchAdapter::new(wrapped(slow_handler(true), layer))
            .timeout(Duration::from_millis(20))
            .backstop(Duration::from_secs(5));

        let outcome = adapter
            .run(session.clone(), interaction(InteractionKind::Command))
            .await;
        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(session.count(SessionOp::EditResponse), 1);
        assert_eq!(session.count(SessionOp::SendFollowup), 0);

        let response = session.response(&InteractionId::new("i1")).unwrap();
        assert!(!response.flags.loading);
        assert_eq!(response.embeds[0].title.as_deref(), Some(ERROR_TITLE));
        let message = response.embeds[0].field_value("Error Message").unwrap();
        assert!(message.contains("deadline"));
    }

    #[tokio::test]
    async fn test_deferred_pipeline_may_finish_after_deadline() {
        let session = Arc::new(MemorySession::default());
        let adapter = DispatchAdapter::new(wrapped(slow_handler(true), ErrorWrapLayer::new(tag())))
            .timeout(Duration::from_millis(20))
            .backstop(Duration::from_secs(5));

        let outcome = adapter
            .run(session.clone(), interaction(InteractionKind::Command))
            .await;
        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(session.count(SessionOp::EditResponse), 0);
        assert!(session.response(&InteractionId::new("i1")).unwrap().flags.loading);
    }

    #[tokio::test]
    async fn test_unacknowledged_overrun_is_reported_as_reply() {
        let session = Arc::new(MemorySession::default());
        let adapter = DispatchAdapter::new(wrapped(slow_handler(false), ErrorWrapLayer::new(tag())))
            .timeout(Duration::from_millis(20))
            .backstop(Duration::from_secs(5));

        adapter
            .run(session.clone(), interaction(InteractionKind::Command))
            .await;
        let response = session.response(&InteractionId::new("i1")).unwrap();
        assert!(response.flags.ephemeral);
        let message = response.embeds[0].field_value("Error Message").unwrap();
        assert!(message.contains("deadline"));
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_is_reported_and_stopped() {
        let session = Arc::new(MemorySession::default());
        let ctx = EventContext::new().with_timeout(Duration::from_secs(10));
        let req = EventRequest {
            ctx: ctx.clone(),
            session: session.clone(),
            event: interaction(InteractionKind::Command),
        };
        let token = ctx.cancellation_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let handler = wrapped(slow_handler(false), ErrorWrapLayer::new(tag()));
        tokio_test::assert_ok!(handler.call(req).await);
        let response = session.response(&InteractionId::new("i1")).unwrap();
        let message = response.embeds[0].field_value("Error Message").unwrap();
        assert!(message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_fatal_fault_logs_backtrace_at_error_level() {
        let (logs, _guard) = capture_logs();
        let handler = EventFunc::new(|_| async {
            let pages: Vec<u32> = Vec::new();
            let _ = pages[7];
            Ok(())
        });
        run(handler, ErrorWrapLayer::new(tag())).await;

        let errors = logs.errors();
        let fatal = errors
            .iter()
            .find(|event| event.message == "fatal fault while executing event")
            .unwrap();
        assert!(fatal.field("correlation_id").is_some());
        assert!(!fatal.field("backtrace").unwrap().is_empty());
    }
}
