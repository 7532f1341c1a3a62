//! 流水号生成算法
//!
//! 简化版的雪花算法：高位是相对固定基准的毫秒偏移量，中间是进程
//! 标识和主机标识，低12位是毫秒内的自增序列。编码后的十进制字符串
//! 会被客户端原样回传，所以布局是对外兼容性契约。

use std::net::UdpSocket;
use std::sync::Mutex;

use chrono::Utc;
use tracking_errors::{TrackingError, TrackingResult};

/// 时间戳基准（毫秒）。
const EPOCH_BASE_MS: u64 = 1_288_834_974_657;
/// 进程标识。
const WORKER_ID: u64 = 1;
/// 毫秒内序列的位数。
const SEQ_BITS: u64 = 12;
/// 主机标识的位数。
const HOST_BITS: u64 = 5;
/// 进程标识的位数。
const WORKER_BITS: u64 = 5;

/// 流水号来源。调度服务通过该抽象获取流水号，测试中可以注入失败。
pub trait SeqNoSource: Send + Sync {
    fn next(&self) -> TrackingResult<String>;
}

#[derive(Debug)]
struct SeqState {
    last_timestamp: u64,
    counter: u64,
}

/// 流水号生成器。同一进程内的并发调用通过互斥锁串行化。
#[derive(Debug)]
pub struct SeqNoGenerator {
    host_id: u64,
    state: Mutex<SeqState>,
}

impl SeqNoGenerator {
    pub fn new() -> Self {
        Self {
            host_id: local_host_id(),
            state: Mutex::new(SeqState {
                last_timestamp: Utc::now().timestamp_millis() as u64,
                counter: 0,
            }),
        }
    }

    /// 生成一个新的流水号。
    pub fn next(&self) -> TrackingResult<String> {
        self.next_at(Utc::now().timestamp_millis() as u64)
    }

    fn next_at(&self, timestamp: u64) -> TrackingResult<String> {
        let mut state = self.state.lock().expect("seq-no state lock poisoned");

        // 当前时间戳小于上次时间戳，说明时钟发生了回拨。
        if timestamp < state.last_timestamp {
            return Err(TrackingError::ClockBackwards {
                behind_ms: state.last_timestamp - timestamp,
            });
        }

        // 同一毫秒内序列号加一，否则序列号从0重新开始。
        if timestamp == state.last_timestamp {
            state.counter = (state.counter + 1) & ((1 << SEQ_BITS) - 1);
        } else {
            state.counter = 0;
        }
        state.last_timestamp = timestamp;

        let encoded = ((timestamp - EPOCH_BASE_MS) << (SEQ_BITS + HOST_BITS + WORKER_BITS))
            | (WORKER_ID << (SEQ_BITS + HOST_BITS))
            | (self.host_id << SEQ_BITS)
            | state.counter;

        Ok(encoded.to_string())
    }
}

impl Default for SeqNoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SeqNoSource for SeqNoGenerator {
    fn next(&self) -> TrackingResult<String> {
        SeqNoGenerator::next(self)
    }
}

/// 从本机的对外IPv4地址推导主机标识（取低位截断到5比特）。
/// 获取失败时退化为0。UDP connect不会发送任何报文。
fn local_host_id() -> u64 {
    let addr = UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .ok();

    match addr {
        Some(std::net::SocketAddr::V4(v4)) => {
            u64::from(v4.ip().octets()[3]) & ((1 << HOST_BITS) - 1)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_monotonic_within_millisecond() {
        let generator = SeqNoGenerator::new();
        let ts = Utc::now().timestamp_millis() as u64 + 1000;
        let a: u64 = generator.next_at(ts).unwrap().parse().unwrap();
        let b: u64 = generator.next_at(ts).unwrap().parse().unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_counter_resets_across_milliseconds() {
        let generator = SeqNoGenerator::new();
        let ts = Utc::now().timestamp_millis() as u64 + 1000;
        generator.next_at(ts).unwrap();
        generator.next_at(ts).unwrap();
        let v: u64 = generator.next_at(ts + 1).unwrap().parse().unwrap();
        assert_eq!(v & 0xFFF, 0);
    }

    #[test]
    fn test_clock_backwards_is_rejected() {
        let generator = SeqNoGenerator::new();
        let ts = Utc::now().timestamp_millis() as u64 + 1000;
        generator.next_at(ts).unwrap();
        let err = generator.next_at(ts - 10).unwrap_err();
        assert!(matches!(
            err,
            TrackingError::ClockBackwards { behind_ms: 10 }
        ));
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(SeqNoGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let generator = Arc::clone(&generator);
            handles.push(std::thread::spawn(move || {
                (0..256)
                    .map(|_| generator.next().unwrap())
                    .collect::<Vec<String>>()
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for no in h.join().unwrap() {
                assert!(seen.insert(no), "duplicated seq-no generated");
            }
        }
    }

    #[test]
    fn test_layout_embeds_timestamp() {
        let generator = SeqNoGenerator::new();
        let ts = Utc::now().timestamp_millis() as u64 + 1000;
        let v: u64 = generator.next_at(ts).unwrap().parse().unwrap();
        assert_eq!(v >> 22, ts - EPOCH_BASE_MS);
    }
}
