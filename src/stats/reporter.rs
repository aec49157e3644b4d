// src/stats/reporter.rs
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Components, System};

/// Statistics related to mining performance
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Total number of SHA-256d header hashes computed
    pub hashes_total: u64,
    /// Number of shares accepted by the pool
    pub shares_accepted: u64,
    /// Number of shares rejected by the pool
    pub shares_rejected: u64,
    /// Shares found for a superseded job and never submitted
    pub shares_stale: u64,
    /// Shares submitted on a connection that dropped before the answer
    pub shares_lost: u64,
    /// Average hashrate since the reporter started (hashes per second)
    pub avg_hashrate: f64,
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently in use (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Collects and reports mining and hardware statistics
pub struct StatsReporter {
    /// Atomic counters for mining statistics
    stats: Arc<MiningStatsAtomic>,
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
    /// Interval at which stats are reported
    report_interval: Duration,
}

/// Atomic version of MiningStats for thread-safe operations
struct MiningStatsAtomic {
    hashes: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    stale: AtomicU64,
    lost: AtomicU64,
    start_time: Instant,
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `report_interval` - How often to log statistics
    pub fn new(report_interval: Duration) -> Self {
        StatsReporter {
            stats: Arc::new(MiningStatsAtomic {
                hashes: AtomicU64::new(0),
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                stale: AtomicU64::new(0),
                lost: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
            report_interval,
        }
    }

    /// Creates and returns a channel sender for share results
    ///
    /// The returned sender can be used to report share outcomes.
    /// The reporter will automatically listen for these events on a background thread.
    pub fn share_sender(&self) -> Sender<ShareResult> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.start_share_listener(rx);
        tx
    }

    /// Creates and returns a channel sender for hash counts
    ///
    /// The scheduler sends one count per batch.
    /// The reporter will automatically listen for these events on a background thread.
    pub fn hash_sender(&self) -> Sender<u64> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.start_hashrate_listener(rx);
        tx
    }

    /// Gets the current mining statistics
    ///
    /// # Returns
    /// A snapshot of the current mining statistics
    pub fn get_stats(&self) -> MiningStats {
        let elapsed = self.stats.start_time.elapsed().as_secs_f64();
        let hashes = self.stats.hashes.load(Ordering::Relaxed);

        MiningStats {
            hashes_total: hashes,
            shares_accepted: self.stats.accepted.load(Ordering::Relaxed),
            shares_rejected: self.stats.rejected.load(Ordering::Relaxed),
            shares_stale: self.stats.stale.load(Ordering::Relaxed),
            shares_lost: self.stats.lost.load(Ordering::Relaxed),
            avg_hashrate: if elapsed > 0.0 {
                hashes as f64 / elapsed
            } else {
                0.0
            },
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    ///
    /// # Returns
    /// A snapshot of the current hardware statistics
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// Starts the periodic reporting of statistics
    ///
    /// This spawns a background thread that logs stats at the configured interval.
    /// The hashrate shown is the rate over the last interval.
    pub fn start_reporting(&self) {
        let stats = self.stats.clone();
        let interval = self.report_interval;

        std::thread::spawn(move || {
            let mut reporter = StatsReporter {
                stats,
                system: System::new_all(),
                components: Components::new_with_refreshed_list(),
                report_interval: interval,
            };
            let mut last_hashes = 0u64;
            let mut last_report = Instant::now();

            loop {
                std::thread::sleep(interval);
                let mining_stats = reporter.get_stats();
                let hw_stats = reporter.get_hardware_stats();

                let window = last_report.elapsed().as_secs_f64().max(f64::EPSILON);
                let recent = (mining_stats.hashes_total - last_hashes) as f64 / window;
                last_hashes = mining_stats.hashes_total;
                last_report = Instant::now();

                log::info!(
                    "Hashrate: {} | Accepted/Rejected: {}/{} | Stale: {} | Lost: {} | CPU: {:.1}% | Temp: {:.1}°C",
                    format_hashrate(recent),
                    mining_stats.shares_accepted,
                    mining_stats.shares_rejected,
                    mining_stats.shares_stale,
                    mining_stats.shares_lost,
                    hw_stats.cpu_usage,
                    hw_stats.temperature
                );
            }
        });
    }

    /// Starts a listener for share results on a background thread
    fn start_share_listener(&self, receiver: Receiver<ShareResult>) {
        let stats = self.stats.clone();

        std::thread::spawn(move || {
            for result in receiver {
                match result {
                    ShareResult::Accepted => stats.accepted.fetch_add(1, Ordering::Relaxed),
                    ShareResult::Rejected => stats.rejected.fetch_add(1, Ordering::Relaxed),
                    ShareResult::Stale => stats.stale.fetch_add(1, Ordering::Relaxed),
                    ShareResult::Lost(n) => stats.lost.fetch_add(n, Ordering::Relaxed),
                };
            }
        });
    }

    /// Starts a listener for hash counts on a background thread
    fn start_hashrate_listener(&self, receiver: Receiver<u64>) {
        let stats = self.stats.clone();

        std::thread::spawn(move || {
            for count in receiver {
                stats.hashes.fetch_add(count, Ordering::Relaxed);
            }
        });
    }
}

/// Human-readable hashrate (H/s, kH/s, MH/s, GH/s)
pub fn format_hashrate(rate: f64) -> String {
    const UNITS: [&str; 4] = ["H/s", "kH/s", "MH/s", "GH/s"];
    let mut rate = rate;
    let mut unit = 0;
    while rate >= 1000.0 && unit < UNITS.len() - 1 {
        rate /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", rate, UNITS[unit])
}

/// Outcome of a share as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResult {
    /// The share was accepted as valid
    Accepted,
    /// The share was rejected by the pool
    Rejected,
    /// The share's job was superseded before submission
    Stale,
    /// Shares pending when the connection dropped
    Lost(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for(reporter: &StatsReporter, done: impl Fn(&MiningStats) -> bool) -> MiningStats {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let stats = reporter.get_stats();
            if done(&stats) || Instant::now() > deadline {
                return stats;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn counts_share_results() {
        let reporter = StatsReporter::new(Duration::from_secs(60));
        let sender = reporter.share_sender();
        for result in [
            ShareResult::Accepted,
            ShareResult::Accepted,
            ShareResult::Rejected,
            ShareResult::Stale,
            ShareResult::Lost(3),
        ] {
            sender.send(result).unwrap();
        }

        let stats = wait_for(&reporter, |s| s.shares_lost == 3);
        assert_eq!(stats.shares_accepted, 2);
        assert_eq!(stats.shares_rejected, 1);
        assert_eq!(stats.shares_stale, 1);
        assert_eq!(stats.shares_lost, 3);
    }

    #[test]
    fn accumulates_hashes() {
        let reporter = StatsReporter::new(Duration::from_secs(60));
        let sender = reporter.hash_sender();
        sender.send(50_000).unwrap();
        sender.send(25_000).unwrap();

        let stats = wait_for(&reporter, |s| s.hashes_total == 75_000);
        assert_eq!(stats.hashes_total, 75_000);
        assert!(stats.avg_hashrate > 0.0);
    }

    #[test]
    fn hashrate_units() {
        assert_eq!(format_hashrate(950.0), "950.00 H/s");
        assert_eq!(format_hashrate(12_500.0), "12.50 kH/s");
        assert_eq!(format_hashrate(3_200_000.0), "3.20 MH/s");
    }
}
