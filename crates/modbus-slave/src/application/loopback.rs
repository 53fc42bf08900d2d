//! Echo protocol stack.
//!
//! Treats whatever is buffered as one frame and answers it with the same
//! bytes.  It carries no Modbus knowledge; it lets the listener, the
//! supervision loop and the I/O log be exercised against any client.

use modbus_slave_core::{
    FrameError, FrameParser, FramingMode, ParsedFrame, ProtocolStack, RequestHandler,
};

/// [`ProtocolStack`] that echoes input back for every framing mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackStack;

impl ProtocolStack for LoopbackStack {
    fn parser(&self, _mode: FramingMode, _master: bool) -> Box<dyn FrameParser> {
        Box::new(WholeBuffer)
    }

    fn request_handler(&self, _mode: FramingMode) -> Box<dyn RequestHandler> {
        Box::new(Echo)
    }
}

struct WholeBuffer;

impl FrameParser for WholeBuffer {
    fn parse(&mut self, buffer: &[u8]) -> Result<Option<ParsedFrame>, FrameError> {
        if buffer.is_empty() {
            return Ok(None);
        }
        Ok(Some(ParsedFrame {
            payload: buffer.to_vec(),
            consumed: buffer.len(),
        }))
    }
}

struct Echo;

impl RequestHandler for Echo {
    fn handle(&mut self, request: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        Ok(Some(request.to_vec()))
    }
}
