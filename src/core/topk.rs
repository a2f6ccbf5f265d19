// src/core/topk.rs

//! A sliding-window Top-K heavy-hitter sketch used by the IP blocker.
//!
//! The structure is a count-min sketch split across a ring of window buckets,
//! plus a small candidate list of the heaviest sources. Every `tick_requests`
//! observations the window advances by one bucket and the two-gate blocking
//! rule runs: the server must be busy (activation gate) and a source must
//! hold more than its allowed share of the window (share gate) before it is
//! reported.

use std::collections::VecDeque;
use std::io::Cursor;
use std::net::IpAddr;
use std::time::Instant;

use murmur3::murmur3_x64_128;

/// Construction parameters, taken from `block_ip` config.
#[derive(Debug, Clone, Copy)]
pub struct TopKParams {
    /// Heavy-hitter candidates retained.
    pub k: usize,
    /// Buckets in the sliding window.
    pub window_buckets: usize,
    /// Counter columns per row.
    pub width: usize,
    /// Independent hash rows.
    pub depth: usize,
    /// Observations per window advance.
    pub tick_requests: u64,
    /// Observed RPS below which a tick never blocks.
    pub activation_rps: f64,
    /// Max share of window capacity per source, 1-100.
    pub max_share_percent: u8,
}

impl From<&crate::config::BlockIpConfig> for TopKParams {
    fn from(cfg: &crate::config::BlockIpConfig) -> Self {
        Self {
            k: cfg.top_k,
            window_buckets: cfg.window_buckets,
            width: cfg.width,
            depth: cfg.depth,
            tick_requests: cfg.tick_requests,
            activation_rps: cfg.activation_rps,
            max_share_percent: cfg.max_share_percent,
        }
    }
}

/// Thread safety is the caller's concern: the pre-router owns the single
/// instance behind a mutex and the critical section is O(depth * window) per
/// observation.
#[derive(Debug)]
pub struct SlidingTopK {
    params: TopKParams,
    /// Per-row hash seeds, fixed at construction.
    seeds: Vec<u32>,
    /// Ring of window buckets, oldest at the front. Each bucket is a
    /// `depth * width` counter matrix.
    buckets: VecDeque<Vec<u32>>,
    /// Heaviest sources seen in the current window, sorted by descending
    /// estimate. Ties keep their insertion order, which makes the walk
    /// deterministic within a tick.
    candidates: Vec<(IpAddr, u64)>,
    requests_since_tick: u64,
    last_tick: Instant,
}

impl SlidingTopK {
    pub fn new(params: TopKParams) -> Self {
        let seeds = (0..params.depth).map(|_| rand::random::<u32>()).collect();
        let buckets = (0..params.window_buckets)
            .map(|_| vec![0u32; params.depth * params.width])
            .collect();
        Self {
            params,
            seeds,
            buckets,
            candidates: Vec::with_capacity(params.k),
            requests_since_tick: 0,
            last_tick: Instant::now(),
        }
    }

    /// Records one request from `ip`.
    ///
    /// Returns `None` while the current bucket is still filling and on ticks
    /// stopped by the activation gate. A tick that reaches the share gate
    /// returns the (possibly empty) list of sources whose window count
    /// strictly exceeds the share threshold.
    pub fn observe(&mut self, ip: IpAddr) -> Option<Vec<IpAddr>> {
        self.increment(ip);
        self.requests_since_tick += 1;
        if self.requests_since_tick < self.params.tick_requests {
            return None;
        }

        let elapsed = self.last_tick.elapsed().as_secs_f64();
        let rps = if elapsed > 0.0 {
            self.params.tick_requests as f64 / elapsed
        } else {
            0.0
        };

        let result = if rps < self.params.activation_rps {
            self.advance_window();
            None
        } else {
            let capacity = self.params.window_buckets as u64 * self.params.tick_requests;
            let threshold = capacity * self.params.max_share_percent as u64 / 100;
            let mut blocked = Vec::new();
            // The candidate list is sorted descending, so the first item at
            // or below the threshold ends the walk.
            for (candidate, count) in &self.candidates {
                if *count > threshold {
                    blocked.push(*candidate);
                } else {
                    break;
                }
            }
            self.advance_window();
            Some(blocked)
        };

        self.requests_since_tick = 0;
        self.last_tick = Instant::now();
        result
    }

    /// Window capacity in requests, `window_buckets * tick_requests`.
    pub fn capacity(&self) -> u64 {
        self.params.window_buckets as u64 * self.params.tick_requests
    }

    /// The share threshold an item must strictly exceed to be blocked.
    pub fn share_threshold(&self) -> u64 {
        self.capacity() * self.params.max_share_percent as u64 / 100
    }

    /// Estimated window count for `ip`: per row, counts are summed across all
    /// window buckets; the minimum over rows bounds collision error.
    pub fn estimate(&self, ip: IpAddr) -> u64 {
        let slots = self.slots(ip);
        let mut min = u64::MAX;
        for (row, slot) in slots.iter().enumerate() {
            let mut sum = 0u64;
            for bucket in &self.buckets {
                sum += bucket[row * self.params.width + slot] as u64;
            }
            min = min.min(sum);
        }
        min
    }

    fn increment(&mut self, ip: IpAddr) {
        let slots = self.slots(ip);
        let width = self.params.width;
        let newest = self
            .buckets
            .back_mut()
            .expect("sketch constructed with at least one bucket");
        for (row, slot) in slots.iter().enumerate() {
            let cell = &mut newest[row * width + slot];
            *cell = cell.saturating_add(1);
        }
        self.update_candidates(ip);
    }

    fn update_candidates(&mut self, ip: IpAddr) {
        let estimate = self.estimate(ip);
        if let Some(pos) = self.candidates.iter().position(|(c, _)| *c == ip) {
            self.candidates[pos].1 = estimate;
        } else if self.candidates.len() < self.params.k {
            self.candidates.push((ip, estimate));
        } else {
            let tail = self.candidates.len() - 1;
            if estimate <= self.candidates[tail].1 {
                return;
            }
            self.candidates[tail] = (ip, estimate);
        }
        // Stable sort keeps equal counts in insertion order.
        self.candidates.sort_by(|a, b| b.1.cmp(&a.1));
    }

    /// Drops the oldest window bucket and starts a fresh one, then re-scores
    /// the candidate list against the shrunk window.
    fn advance_window(&mut self) {
        self.buckets.pop_front();
        self.buckets
            .push_back(vec![0u32; self.params.depth * self.params.width]);

        for i in 0..self.candidates.len() {
            let ip = self.candidates[i].0;
            self.candidates[i].1 = self.estimate(ip);
        }
        self.candidates.retain(|(_, count)| *count > 0);
        self.candidates.sort_by(|a, b| b.1.cmp(&a.1));
    }

    /// One column index per row for `ip`, derived by double hashing the
    /// 128-bit murmur3 digest of the address bytes.
    fn slots(&self, ip: IpAddr) -> Vec<usize> {
        let bytes = ip_bytes(ip);
        self.seeds
            .iter()
            .map(|seed| {
                let hash = murmur3_x64_128(&mut Cursor::new(&bytes[..]), *seed).unwrap();
                let h1 = hash as u64;
                let h2 = (hash >> 64) as u64;
                (h1.wrapping_add(h2) % self.params.width as u64) as usize
            })
            .collect()
    }
}

/// Canonical 16-byte form of an address; V4 goes through its V6 mapping so a
/// given client hashes identically regardless of socket family.
fn ip_bytes(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}
