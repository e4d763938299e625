//! On/off traffic source.
//!
//! While on, the source writes `packet_size` bytes to its socket at `rate`;
//! writes refused by a full send buffer are discarded, not retried.

use tracing::debug;
use crate::context::{Event, SimulationContext};
use crate::error::Result;
use crate::net::FlowId;
use crate::sim::{Bw, Bytes, EventHandle, Time};
use crate::tcp::TransportSocket;

#[derive(Debug)]
pub struct OnOffSource {
    flow: FlowId,
    rate: Bw,
    packet_size: Bytes,
    on_time: Time,
    /// Zero keeps the source on for its whole active window.
    off_time: Time,
    start: Time,
    stop: Time,
    on: bool,
    next_send: Option<EventHandle>,
    bytes_written: Bytes,
    bytes_refused: Bytes,
}

impl OnOffSource {
    pub fn new(flow: FlowId, rate: Bw, packet_size: Bytes, on_time: Time, off_time: Time, start: Time, stop: Time) -> Self {
        Self {
            flow,
            rate,
            packet_size,
            on_time,
            off_time,
            start,
            stop,
            on: false,
            next_send: None,
            bytes_written: 0,
            bytes_refused: 0,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn bytes_written(&self) -> Bytes {
        self.bytes_written
    }

    pub fn bytes_refused(&self) -> Bytes {
        self.bytes_refused
    }

    /// Schedule the first on period.
    pub fn start(&mut self, ctx: &mut SimulationContext) -> Result<()> {
        ctx.queue.schedule_at(self.start, Event::AppToggle { flow: self.flow })?;
        Ok(())
    }

    pub fn on_toggle(&mut self, ctx: &mut SimulationContext) -> Result<()> {
        let now = ctx.now();
        if now >= self.stop || self.on {
            self.on = false;
            if let Some(handle) = self.next_send.take() {
                ctx.queue.cancel(handle);
            }
            if now < self.stop {
                let resume = (now + self.off_time).min(self.stop);
                ctx.queue.schedule_at(resume, Event::AppToggle { flow: self.flow })?;
            }
            debug!(%now, flow = %self.flow, written = self.bytes_written, refused = self.bytes_refused, "source off");
            return Ok(());
        }

        self.on = true;
        let handle = ctx.queue.schedule(Time::zero(), Event::AppSend { flow: self.flow })?;
        self.next_send = Some(handle);
        let until = if self.off_time.quanta() > 0 { (now + self.on_time).min(self.stop) } else { self.stop };
        ctx.queue.schedule_at(until, Event::AppToggle { flow: self.flow })?;
        debug!(%now, flow = %self.flow, rate = %self.rate, "source on");
        Ok(())
    }

    /// Write one chunk and schedule the next one.
    pub fn on_send(&mut self, ctx: &mut SimulationContext, socket: &mut TransportSocket) -> Result<()> {
        self.next_send = None;
        if !self.on {
            return Ok(());
        }
        if socket.write(self.packet_size) {
            self.bytes_written += self.packet_size;
        } else {
            self.bytes_refused += self.packet_size;
        }
        let interval = self.rate.bytes_tx_time(self.packet_size);
        let handle = ctx.queue.schedule(interval, Event::AppSend { flow: self.flow })?;
        self.next_send = Some(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::{SocketConfig, Variant};

    #[test]
    fn writes_at_rate_during_on_periods() {
        let flow = FlowId(1);
        let mut ctx = SimulationContext::new(1);
        let config = SocketConfig { send_buffer: 1 << 30, ..Default::default() };
        let mut socket = TransportSocket::new(flow, 0, 1, config, Variant::Cubic.build(536, 1));
        // 512 bytes every 4.096ms, on for 100ms then off for 100ms
        let mut source = OnOffSource::new(
            flow,
            Bw::from_bits(1_000_000),
            512,
            Time::millis(100),
            Time::millis(100),
            Time::seconds(1),
            Time::millis(1300),
        );
        source.start(&mut ctx).unwrap();
        let mut toggles = vec![];
        while let Some((when, event)) = ctx.queue.pop_until(Time::seconds(2)) {
            match event {
                Event::AppToggle { .. } => {
                    source.on_toggle(&mut ctx).unwrap();
                    toggles.push((when, source.is_on()));
                },
                Event::AppSend { .. } => source.on_send(&mut ctx, &mut socket).unwrap(),
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(toggles, vec![
            (Time::seconds(1), true),
            (Time::millis(1100), false),
            (Time::millis(1200), true),
            (Time::millis(1300), false),
        ]);
        // 25 writes in each 100ms on period: at 0, 4.096, ..., 98.304ms
        assert_eq!(source.bytes_written(), 2 * 25 * 512);
        assert_eq!(socket.pending(), 2 * 25 * 512);
        assert_eq!(source.bytes_refused(), 0);
    }

    #[test]
    fn full_buffer_refuses_writes() {
        let flow = FlowId(1);
        let mut ctx = SimulationContext::new(1);
        let config = SocketConfig { send_buffer: 2048, ..Default::default() };
        let mut socket = TransportSocket::new(flow, 0, 1, config, Variant::Bbr.build(536, 1));
        let mut source = OnOffSource::new(flow, Bw::from_mbits(10), 512, Time::seconds(1), Time::zero(), Time::zero(), Time::millis(10));
        source.start(&mut ctx).unwrap();
        while let Some((_, event)) = ctx.queue.pop_until(Time::seconds(1)) {
            match event {
                Event::AppToggle { .. } => source.on_toggle(&mut ctx).unwrap(),
                Event::AppSend { .. } => source.on_send(&mut ctx, &mut socket).unwrap(),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(source.bytes_written(), 2048);
        assert!(source.bytes_refused() > 0);
        assert!(!source.is_on());
    }
}
