//! Request/response pairing.
//!
//! Every new connection gets its own pairing thread. The thread reads a
//! request from the up stream, then the matching response from the down
//! stream, renders the exchange and queues it on the printer. It exits when
//! either stream ends, on a parse error, or after a `101` upgrade.

use super::filter::ExchangeFilter;
use super::message::{read_request, read_response, BodyReader, RequestHead, ResponseHead};
use super::render::{Level, RenderOptions, Transcript};
use super::HttpError;
use crate::assembly::stream::{self, Ready};
use crate::assembly::{ConnectionHandler, ConnectionStreams, StreamReader};
use crate::flow::Endpoint;
use crate::output::Printer;
use crate::pipeline::Supervisor;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

/// Used for exchanges that are filtered out: bodies are still consumed, but
/// nothing worth keeping is rendered.
const QUIET: RenderOptions = RenderOptions {
    level: Level::Url,
    curl: false,
    pretty: false,
    force: false,
    max_body: 0,
};

/// Spawns a pairing thread for each connection handed over by the assembler.
pub struct HttpConnectionHandler {
    options: RenderOptions,
    filter: Arc<ExchangeFilter>,
    printer: Arc<Printer>,
    supervisor: Arc<Supervisor>,
}

impl HttpConnectionHandler {
    pub fn new(
        options: RenderOptions,
        filter: ExchangeFilter,
        printer: Arc<Printer>,
        supervisor: Arc<Supervisor>,
    ) -> Self {
        HttpConnectionHandler {
            options,
            filter: Arc::new(filter),
            printer,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }
}

impl ConnectionHandler for HttpConnectionHandler {
    fn handle(&self, src: Endpoint, dst: Endpoint, streams: ConnectionStreams) {
        let pairing = Pairing {
            client: src,
            server: dst,
            options: self.options,
            filter: self.filter.clone(),
            printer: self.printer.clone(),
        };
        let name = format!("http-{}", src.port);
        if let Err(err) = self.supervisor.spawn(name, move || pairing.run(streams)) {
            // The streams were dropped with the closure; the writer side
            // discards everything for this connection.
            tracing::warn!(client = %src, server = %dst, error = %err, "failed to spawn pairing thread");
        }
    }

    fn finish(&self) {
        tracing::debug!(active = self.supervisor.active(), "assembler finished, pairing threads draining");
    }
}

/// Wait until either direction has input. True when the client has sent
/// bytes and the server has not answered yet; the server wins a tie.
fn body_sent_first(up: &mut Stream, down: &Stream) -> bool {
    if !down.buffer().is_empty() || down.get_ref().has_input() {
        return false;
    }
    if up.buffer().is_empty() && stream::ready(down.get_ref(), up.get_ref()) == Ready::First {
        return false;
    }
    // Ready without data means the client side ended.
    matches!(up.fill_buf(), Ok(buf) if !buf.is_empty())
}

enum Next {
    Continue,
    Stop,
}

type Stream = BufReader<StreamReader>;

pub(crate) struct Pairing {
    pub(crate) client: Endpoint,
    pub(crate) server: Endpoint,
    pub(crate) options: RenderOptions,
    pub(crate) filter: Arc<ExchangeFilter>,
    pub(crate) printer: Arc<Printer>,
}

impl Pairing {
    pub(crate) fn run(self, streams: ConnectionStreams) {
        let ConnectionStreams { up, down } = streams;
        let mut up = BufReader::new(up);
        let mut down = BufReader::new(down);

        let mut exchanges = 0u64;
        loop {
            let request = match read_request(&mut up) {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(err) if err.is_eof() => break,
                Err(err) => {
                    tracing::warn!(client = %self.client, server = %self.server, error = %err, "request parse failed, giving up on connection");
                    break;
                }
            };
            exchanges += 1;
            match self.exchange(&mut up, &mut down, &request) {
                Next::Continue => {}
                Next::Stop => break,
            }
        }

        // Anything the assembler still delivers for this connection is
        // discarded from here on.
        up.get_ref().close();
        down.get_ref().close();
        tracing::debug!(client = %self.client, server = %self.server, exchanges, "pairing finished");
    }

    fn exchange(&self, up: &mut Stream, down: &mut Stream, request: &RequestHead) -> Next {
        let mut shown = self.filter.matches_request(request);
        let options = if shown { &self.options } else { &QUIET };
        let mut transcript = Transcript::new(options);
        let request_ts = up.get_ref().last_timestamp();
        transcript.request_head(self.client, self.server, request_ts, request);

        // With `Expect: 100-continue` the body follows the server's 100.
        let mut body_pending = request.expects_continue();
        if !body_pending {
            if let Err(err) = transcript.request_body(request, &mut BodyReader::new(up, request.body)) {
                return self.body_failed(transcript, shown, err, "request");
            }
        }

        let response = loop {
            // Clients stop waiting for the 100 after a while and send the
            // body anyway; it has to be taken off the up stream before the
            // server answers.
            if body_pending && body_sent_first(up, down) {
                body_pending = false;
                if let Err(err) = transcript.request_body(request, &mut BodyReader::new(up, request.body)) {
                    return self.body_failed(transcript, shown, err, "request");
                }
            }
            let response = match read_response(down, &request.method) {
                Ok(Some(response)) => response,
                Ok(None) => {
                    tracing::debug!(client = %self.client, uri = %request.uri, "stream ended before response");
                    return Next::Stop;
                }
                Err(err) => return self.response_failed(err),
            };
            if response.code == 100 && body_pending {
                transcript.interim(&response);
                body_pending = false;
                if let Err(err) = transcript.request_body(request, &mut BodyReader::new(up, request.body)) {
                    return self.body_failed(transcript, shown, err, "request");
                }
                continue;
            }
            if response.is_informational() && response.code != 101 {
                transcript.interim(&response);
                continue;
            }
            break response;
        };

        // The client never sends the body after 417. For any other final
        // response without a 100 first, it sent the body anyway.
        if body_pending && response.code != 417 {
            if let Err(err) = transcript.request_body(request, &mut BodyReader::new(up, request.body)) {
                return self.body_failed(transcript, shown, err, "request");
            }
        }

        shown &= self.filter.matches_status(response.code);
        if let Err(err) = transcript.response(&response, &mut BodyReader::new(down, response.body)) {
            return self.body_failed(transcript, shown, err, "response");
        }
        self.emit(transcript, shown);

        if response.code == 101 {
            self.upgraded(&response);
            return Next::Stop;
        }
        Next::Continue
    }

    fn emit(&self, transcript: Transcript<'_>, shown: bool) {
        if shown {
            self.printer.send(transcript.into_string());
        }
    }

    /// A body that hit end-of-stream is emitted as far as it got. Any other
    /// error leaves the stream position unknown, so the exchange is dropped.
    fn body_failed(&self, transcript: Transcript<'_>, shown: bool, err: io::Error, which: &str) -> Next {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            tracing::debug!(client = %self.client, body = which, "stream ended inside body");
            self.emit(transcript, shown);
        } else {
            tracing::warn!(client = %self.client, server = %self.server, body = which, error = %err, "body read failed, giving up on connection");
        }
        Next::Stop
    }

    fn response_failed(&self, err: HttpError) -> Next {
        if err.is_eof() {
            tracing::debug!(client = %self.client, "stream ended inside response head");
        } else {
            tracing::warn!(client = %self.client, server = %self.server, error = %err, "response parse failed, giving up on connection");
        }
        Next::Stop
    }

    fn upgraded(&self, response: &ResponseHead) {
        tracing::debug!(
            client = %self.client,
            server = %self.server,
            websocket = response.is_websocket_upgrade(),
            "protocol switched, no longer parsing http"
        );
    }
}
