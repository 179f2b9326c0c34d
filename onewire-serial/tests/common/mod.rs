#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Instant;

use onewire_bus::OneWireResult;
use onewire_serial::ByteTransport;

/// A scripted transport. Replies are staged in chunks; each `read` call
/// serves from the current chunk, and an empty chunk makes the next
/// read report silence, ending one exchange window.
pub struct Script {
    pub baud: u32,
    pub written: Vec<u8>,
    pub replies: VecDeque<Vec<u8>>,
    pub closed: bool,
}

impl Script {
    pub fn new() -> Self {
        Script {
            baud: 9600,
            written: Vec::new(),
            replies: VecDeque::new(),
            closed: false,
        }
    }

    /// Stages one reply chunk followed by a silence marker.
    pub fn reply(&mut self, bytes: &[u8]) -> &mut Self {
        self.replies.push_back(bytes.to_vec());
        self.replies.push_back(Vec::new());
        self
    }

    /// Stages a reply chunk with no trailing silence.
    pub fn reply_run(&mut self, bytes: &[u8]) -> &mut Self {
        self.replies.push_back(bytes.to_vec());
        self
    }
}

impl ByteTransport for Script {
    fn write(&mut self, bytes: &[u8]) -> OneWireResult<usize> {
        self.written.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8], _deadline: Instant) -> OneWireResult<usize> {
        let Some(mut chunk) = self.replies.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.replies.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn set_baud(&mut self, baud: u32) -> OneWireResult<()> {
        self.baud = baud;
        Ok(())
    }

    fn baud(&self) -> u32 {
        self.baud
    }

    fn reset_errors(&mut self) -> OneWireResult<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Encodes a single-device accelerator reply: ROM bits in the high bit
/// of each pair, no discrepancies.
pub fn accelerator_reply(rom: &[u8; 8]) -> [u8; 16] {
    let mut reply = [0u8; 16];
    for bit in 0..64usize {
        if rom[bit / 8] & (1 << (bit % 8)) != 0 {
            reply[bit / 4] |= 1 << ((bit % 4) * 2 + 1);
        }
    }
    reply
}
