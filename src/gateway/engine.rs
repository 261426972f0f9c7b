//! Inbound dispatch.
//!
//! The [`Gateway`] drains the inbound channel between control ticks and
//! turns each payload into at most one application command:
//!
//! ```text
//! InboundMessage ─▶ gate (expiry, debounce) ─▶ parse ─┬▶ command ──────────▶ AppService
//!                                                     └▶ fragment ─▶ assemble ─▶ ApplyConfig
//! ```
//!
//! Every parsed command gets an acknowledgement on the system topic.
//! Transfer failures additionally go out on the errors topic.

use log::{debug, warn};

use crate::app::commands::AppCommand;
use crate::app::events::{AppEvent, CommandAck, ErrorReport, ErrorSource, RequestId};
use crate::app::ports::EventSink;
use crate::app::service::AppService;
use crate::error::{CommandError, Error, TransferError};
use crate::time::Millis;

use super::channels::{InboundChannel, InboundMessage};
use super::command::{CommandGate, Inbound, parse};
use super::fragments::{self, ConfigFragment, Progress, TransferAssembler, decode_document};

#[derive(Default)]
pub struct Gateway {
    gate: CommandGate,
    assembler: TransferAssembler,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire a stalled transfer, then process everything queued.
    pub fn poll(
        &mut self,
        channel: &InboundChannel,
        now: Millis,
        app: &mut AppService,
        sink: &mut impl EventSink,
    ) {
        let timeout = app.config().timing.transfer_timeout_ms;
        if let Some(expired) = self.assembler.expire(now, timeout) {
            sink.emit(&transfer_error(TransferError::TimedOut, Some(expired.version)));
        }

        while let Ok(msg) = channel.try_receive() {
            self.process(&msg, now, app, sink);
        }
    }

    /// Handle one inbound message.
    pub fn process(
        &mut self,
        msg: &InboundMessage,
        now: Millis,
        app: &mut AppService,
        sink: &mut impl EventSink,
    ) {
        let timing = app.config().timing;
        match self.gate.check(&msg.payload, msg.received_at, now, &timing) {
            Ok(()) => {}
            Err(CommandError::Debounced) => {
                debug!("Command debounced");
                return;
            }
            Err(e) => {
                warn!("Command dropped: {e}");
                // Id and name are only known if the payload parses.
                let parsed = parse(&msg.payload).ok();
                let id = parsed.as_ref().and_then(|p| p.id().cloned());
                let name = parsed.as_ref().map_or("unknown", Inbound::name);
                sink.emit(&ack(id, name, Err(e.into())));
                return;
            }
        }

        let inbound = match parse(&msg.payload) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Malformed command ({} bytes)", msg.payload.len());
                sink.emit(&AppEvent::Error(ErrorReport {
                    source: ErrorSource::Command,
                    code: e.code(),
                    detail: None,
                    version: None,
                }));
                return;
            }
        };

        match inbound {
            Inbound::Command { id, command } => {
                let name = command.name();
                let result = app.handle_command(command, now, sink);
                if let Err(e) = &result {
                    warn!("Command {name} failed: {e}");
                }
                sink.emit(&ack(id, name, result));
            }
            Inbound::Fragment { id, fragment } => {
                let version = fragment.version;
                let result = self.feed(fragment, now, app, sink);
                if let Err(Error::Transfer(t)) = result {
                    sink.emit(&transfer_error(t, Some(version)));
                }
                sink.emit(&ack(id, fragments::KIND, result));
            }
        }
    }

    fn feed(
        &mut self,
        fragment: ConfigFragment,
        now: Millis,
        app: &mut AppService,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let fed = self.assembler.feed(fragment, app.applied_version(), now)?;
        if let Some(old) = fed.superseded {
            sink.emit(&transfer_error(TransferError::Superseded, Some(old)));
        }
        match fed.progress {
            Progress::Pending { received, total } => {
                debug!("Transfer fragment {received}/{total} stored");
                Ok(())
            }
            Progress::Duplicate => Ok(()),
            Progress::Complete { version, document } => {
                let config = decode_document(&document, app.config())?;
                app.handle_command(AppCommand::ApplyConfig { version, config }, now, sink)
            }
        }
    }

    /// Version of the transfer being assembled, if any.
    pub fn transfer_in_flight(&self) -> Option<u32> {
        self.assembler.in_flight()
    }
}

fn ack(id: Option<RequestId>, command: &'static str, result: Result<(), Error>) -> AppEvent {
    AppEvent::CommandAck(CommandAck {
        id,
        command,
        ok: result.is_ok(),
        reason: result.err().map(Error::reason),
    })
}

fn transfer_error(e: TransferError, version: Option<u32>) -> AppEvent {
    let detail = match e {
        TransferError::Invalid(field) => Some(field),
        _ => None,
    };
    AppEvent::Error(ErrorReport {
        source: ErrorSource::Transfer,
        code: e.code(),
        detail,
        version,
    })
}
