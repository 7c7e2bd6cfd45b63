use crate::trace::{Direction, PacketRecord};

/// One sliding-window throughput sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub begin_time: f64,
    pub end_time: f64,
    pub upload_bytes: u64,
    pub download_bytes: u64,
}

impl Throughput {
    pub fn sample_period(&self) -> f64 {
        self.end_time - self.begin_time
    }

    pub fn upload_kbps(&self) -> f64 {
        self.upload_bytes as f64 * 8.0 / 1000.0 / self.sample_period()
    }

    pub fn download_kbps(&self) -> f64 {
        self.download_bytes as f64 * 8.0 / 1000.0 / self.sample_period()
    }

    pub fn upload_mbps(&self) -> f64 {
        self.upload_kbps() / 1000.0
    }

    pub fn download_mbps(&self) -> f64 {
        self.download_kbps() / 1000.0
    }
}

/// Sliding-window up/down byte rates over `[start, end)` with window
/// `window` seconds. Packets must be sorted by timestamp; results are
/// undefined otherwise. A final partial bin covers any leftover time.
pub fn calculate_throughput(
    start: f64,
    end: f64,
    window: f64,
    packets: &[PacketRecord],
) -> Vec<Throughput> {
    let mut result = Vec::new();
    if packets.is_empty() || window <= 0.0 {
        return result;
    }

    let steps = ((end - start) / window) as usize;
    let mut head = packets.iter().peekable();
    let mut tail = packets.iter().peekable();
    let mut head_up = 0u64;
    let mut head_down = 0u64;
    let mut tail_up = 0u64;
    let mut tail_down = 0u64;

    let mut advance = |iter: &mut std::iter::Peekable<std::slice::Iter<'_, PacketRecord>>,
                       up: &mut u64,
                       down: &mut u64,
                       limit: f64| {
        while let Some(packet) = iter.peek() {
            if packet.timestamp >= limit {
                break;
            }
            match packet.direction {
                Direction::Uplink => *up += packet.len() as u64,
                Direction::Downlink => *down += packet.len() as u64,
                Direction::Unknown => {}
            }
            iter.next();
        }
    };

    let mut end_ts = start;
    for _ in 1..=steps {
        end_ts += window;
        let begin_ts = end_ts - window;
        if begin_ts < start {
            continue;
        }
        advance(&mut head, &mut head_up, &mut head_down, begin_ts);
        advance(&mut tail, &mut tail_up, &mut tail_down, end_ts);
        result.push(Throughput {
            begin_time: begin_ts,
            end_time: end_ts,
            upload_bytes: tail_up - head_up,
            download_bytes: tail_down - head_down,
        });
    }

    // Leftover partial bin.
    if end > end_ts {
        let begin_ts = (end - window) + (end_ts + window - end);
        advance(&mut head, &mut head_up, &mut head_down, begin_ts);
        advance(&mut tail, &mut tail_up, &mut tail_down, end);
        result.push(Throughput {
            begin_time: begin_ts,
            end_time: end,
            upload_bytes: tail_up - head_up,
            download_bytes: tail_down - head_down,
        });
    }

    result
}
