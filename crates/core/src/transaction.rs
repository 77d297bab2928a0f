//! Transaction client: one request, one response, under the session lock.
//!
//! The bus itself sits behind the [`Transport`] trait so that the hidapi
//! backend in the CLI and the mock used by tests share one interface.

use crate::error::{Error, Result};
use crate::report::{parse_response, Report, ReportBuilder, Status, REPORT_LEN};
use crate::session::DeviceSession;
use std::time::Duration;
use tracing::{trace, warn};

/// Blocking request/response primitive provided by the environment.
pub trait Transport: Send + Sync {
    /// Send `request` on `channel_index` and return the raw response read
    /// from `response_channel_index`.
    ///
    /// The device needs at least `min_wait` before a response is ready;
    /// implementations give up after `max_wait`.
    fn exchange(
        &self,
        channel_index: u8,
        request: &[u8; REPORT_LEN],
        response_channel_index: u8,
        min_wait: Duration,
        max_wait: Duration,
    ) -> Result<Vec<u8>>;
}

/// Run one exchange on `session`.
///
/// Finalizes the request, holds the session's transaction lock for the whole
/// exchange, then validates the echo fields and maps the status byte.
/// `Busy` and `New` responses are returned as `Ok`; the caller inspects
/// [`Report::status`] and decides whether to retry. Nothing is retried here.
pub fn execute(session: &DeviceSession, request: ReportBuilder) -> Result<Report> {
    let request = request.finalize();
    let timing = session.timing();

    let _guard = session.transaction_lock().lock();

    trace!(
        model = %session.model(),
        transaction_id = %request.transaction_id(),
        report_hex = format_args!("{:02X?}", request.as_bytes()),
        "Razer TX"
    );

    let raw = session
        .transport()
        .exchange(
            session.report_index(),
            request.as_bytes(),
            session.response_index(),
            timing.min_wait(),
            timing.max_wait(),
        )
        .map_err(|e| match e {
            Error::Transport(_) => e,
            other => Error::Transport(other.to_string()),
        })?;

    let response = parse_response(&raw)?;

    trace!(
        status = ?response.status(),
        report_hex = format_args!("{:02X?}", response.as_bytes()),
        "Razer RX"
    );

    check_response(&request, response)
}

/// Validate a response against the request it should answer.
pub fn check_response(request: &Report, response: Report) -> Result<Report> {
    if response.echo() != request.echo() {
        warn!(
            request = %request.describe(),
            response = %response.describe(),
            "Response does not answer request"
        );
        return Err(Error::ResponseMismatch {
            request: request.echo(),
            response: response.echo(),
        });
    }

    match response.status() {
        Status::Successful | Status::Busy | Status::New => {
            if response.status() != Status::Successful {
                warn!(response = %response.describe(), "Device busy");
            }
            Ok(response)
        }
        Status::Failure => {
            warn!(response = %response.describe(), "Command failed");
            Err(Error::DeviceFailure(Box::new(response)))
        }
        Status::NotSupported => {
            warn!(response = %response.describe(), "Command not supported");
            Err(Error::DeviceNotSupported(Box::new(response)))
        }
        Status::Timeout => {
            warn!(response = %response.describe(), "Command timed out");
            Err(Error::DeviceTimeout(Box::new(response)))
        }
        Status::Unknown(b) => {
            warn!(response = %response.describe(), "Unknown status byte");
            Err(Error::MalformedResponse(format!("unknown status 0x{b:02X}")))
        }
    }
}

/// Require a fully processed response.
///
/// Reads cannot use the payload of a response that is still `Busy` or `New`.
pub fn require_complete(response: Report) -> Result<Report> {
    match response.status() {
        Status::Successful => Ok(response),
        _ => Err(Error::DeviceBusy(Box::new(response))),
    }
}

/// A mock transport for testing.
///
/// Answers every request with an echo of its header and a `Successful`
/// status. Per-command argument bytes and statuses can be configured, raw
/// responses or errors can be queued, and a responder closure can stand in
/// for a whole device. Every exchange is recorded.
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::report::{Status, TransactionId};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    type Responder = Box<dyn Fn(&Report) -> Result<Vec<u8>> + Send + Sync>;

    /// One recorded call to [`Transport::exchange`].
    #[derive(Debug, Clone)]
    pub struct Exchange {
        pub channel_index: u8,
        pub request: Report,
        pub response_channel_index: u8,
        pub min_wait: Duration,
        pub max_wait: Duration,
    }

    #[derive(Default)]
    pub struct MockTransport {
        queued: Mutex<VecDeque<Result<Vec<u8>>>>,
        replies: Mutex<HashMap<(u8, u8), Vec<u8>>>,
        statuses: Mutex<HashMap<(u8, u8), Status>>,
        responder: Option<Responder>,
        exchanges: Mutex<Vec<Exchange>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Let `f` produce every response that is not queued.
        pub fn with_responder(
            f: impl Fn(&Report) -> Result<Vec<u8>> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Some(Box::new(f)),
                ..Self::default()
            }
        }

        /// Argument bytes returned for `(class, id)`.
        pub fn reply(&self, class: u8, id: u8, args: &[u8]) {
            self.replies.lock().insert((class, id), args.to_vec());
        }

        /// Status returned for `(class, id)`.
        pub fn status(&self, class: u8, id: u8, status: Status) {
            self.statuses.lock().insert((class, id), status);
        }

        /// Queue raw response bytes for the next exchange.
        pub fn push_raw(&self, bytes: Vec<u8>) {
            self.queued.lock().push_back(Ok(bytes));
        }

        /// Queue a transport failure for the next exchange.
        pub fn push_error(&self, message: &str) {
            self.queued
                .lock()
                .push_back(Err(Error::Transport(message.to_string())));
        }

        pub fn exchanges(&self) -> Vec<Exchange> {
            self.exchanges.lock().clone()
        }

        pub fn requests(&self) -> Vec<Report> {
            self.exchanges.lock().iter().map(|e| e.request.clone()).collect()
        }

        pub fn exchange_count(&self) -> usize {
            self.exchanges.lock().len()
        }
    }

    impl Transport for MockTransport {
        fn exchange(
            &self,
            channel_index: u8,
            request: &[u8; REPORT_LEN],
            response_channel_index: u8,
            min_wait: Duration,
            max_wait: Duration,
        ) -> Result<Vec<u8>> {
            let request = parse_response(request)?;
            self.exchanges.lock().push(Exchange {
                channel_index,
                request: request.clone(),
                response_channel_index,
                min_wait,
                max_wait,
            });

            if let Some(queued) = self.queued.lock().pop_front() {
                return queued;
            }
            if let Some(responder) = &self.responder {
                return responder(&request);
            }

            let key = (request.command_class(), request.command_id());
            let status = self
                .statuses
                .lock()
                .get(&key)
                .copied()
                .unwrap_or(Status::Successful);
            let args = self
                .replies
                .lock()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| request.payload().to_vec());
            Ok(respond(&request, status, &args))
        }
    }

    /// Raw bytes of a response that echoes `request`.
    pub fn respond(request: &Report, status: Status, args: &[u8]) -> Vec<u8> {
        let size = request.data_size().max(args.len()) as u8;
        let mut b = ReportBuilder::new(request.command_class(), request.command_id(), size)
            .unwrap()
            .transaction_id(request.transaction_id())
            .remaining_packets(request.remaining_packets())
            .status(status);
        b.set_args(0, args).unwrap();
        b.finalize().as_bytes().to_vec()
    }

    /// Raw bytes of a response with arbitrary header fields.
    pub fn raw_response(status: Status, packets: u16, class: u8, id: u8, args: &[u8]) -> Vec<u8> {
        let mut b = ReportBuilder::new(class, id, args.len() as u8)
            .unwrap()
            .transaction_id(TransactionId::STANDARD)
            .remaining_packets(packets)
            .status(status);
        b.set_args(0, args).unwrap();
        b.finalize().as_bytes().to_vec()
    }
}
