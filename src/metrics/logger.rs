//! Epoch loggers for experiment launches.
//!
//! Provides console and CSV logging backends behind one trait so a launch
//! can fan metrics out to several sinks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Metrics recorded at the end of one training epoch.
#[derive(Debug, Clone)]
pub struct EpochSnapshot {
    pub epoch: usize,
    /// Total environment steps collected so far.
    pub env_steps: usize,
    /// Completed rollout episodes.
    pub episodes: usize,
    /// Mean undiscounted return of recent evaluation episodes.
    pub mean_return: f32,
    /// Fraction of recent evaluation episodes ending in success.
    pub success_rate: f32,
    pub policy_loss: f32,
    /// Mean of the twin Q-function losses.
    pub qf_loss: f32,
    pub vf_loss: f32,
    /// Current entropy coefficient.
    pub alpha: f32,
}

impl EpochSnapshot {
    pub fn new(epoch: usize, env_steps: usize, episodes: usize) -> Self {
        Self {
            epoch,
            env_steps,
            episodes,
            mean_return: 0.0,
            success_rate: 0.0,
            policy_loss: 0.0,
            qf_loss: 0.0,
            vf_loss: 0.0,
            alpha: 0.0,
        }
    }

    pub fn with_eval(mut self, mean_return: f32, success_rate: f32) -> Self {
        self.mean_return = mean_return;
        self.success_rate = success_rate;
        self
    }

    pub fn with_losses(mut self, policy_loss: f32, qf_loss: f32, vf_loss: f32) -> Self {
        self.policy_loss = policy_loss;
        self.qf_loss = qf_loss;
        self.vf_loss = vf_loss;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }
}

/// Logging backend for epoch metrics.
pub trait MetricsLogger: Send {
    fn log(&mut self, snapshot: &EpochSnapshot);

    fn flush(&mut self);
}

/// Console logger with a fixed-width table layout.
pub struct ConsoleLogger {
    log_interval: usize,
    last_log_epoch: Option<usize>,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    /// `log_interval` is the number of epochs between printed rows.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            last_log_epoch: None,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    pub fn reset_timer(&mut self) {
        self.start_time = Instant::now();
    }

    fn print_header(&self) {
        println!(
            "{:>8} {:>10} {:>8} {:>9} {:>8} {:>10} {:>10} {:>10} {:>8} {:>8}",
            "Epoch", "EnvSteps", "Episodes", "Return", "Success", "Policy", "QF", "VF", "Alpha", "SPS"
        );
        println!("{}", "-".repeat(98));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &EpochSnapshot) {
        if let Some(last) = self.last_log_epoch {
            if snapshot.epoch < last + self.log_interval {
                return;
            }
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let elapsed = self.start_time.elapsed().as_secs_f32();
        let sps = if elapsed > 0.0 {
            snapshot.env_steps as f32 / elapsed
        } else {
            0.0
        };

        println!(
            "{:>8} {:>10} {:>8} {:>9.2} {:>8.2} {:>10.4} {:>10.4} {:>10.4} {:>8.4} {:>8.0}",
            snapshot.epoch,
            snapshot.env_steps,
            snapshot.episodes,
            snapshot.mean_return,
            snapshot.success_rate,
            snapshot.policy_loss,
            snapshot.qf_loss,
            snapshot.vf_loss,
            snapshot.alpha,
            sps
        );

        self.last_log_epoch = Some(snapshot.epoch);
    }

    fn flush(&mut self) {
        // stdout is line-buffered
    }
}

/// CSV logger, one row per epoch.
pub struct CsvLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CsvLogger {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "epoch,env_steps,episodes,mean_return,success_rate,policy_loss,qf_loss,vf_loss,alpha,elapsed_secs"
        )?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }
}

impl MetricsLogger for CsvLogger {
    fn log(&mut self, snapshot: &EpochSnapshot) {
        let elapsed = self.start_time.elapsed().as_secs_f32();

        let _ = writeln!(
            self.writer,
            "{},{},{},{:.4},{:.4},{:.6},{:.6},{:.6},{:.6},{:.2}",
            snapshot.epoch,
            snapshot.env_steps,
            snapshot.episodes,
            snapshot.mean_return,
            snapshot.success_rate,
            snapshot.policy_loss,
            snapshot.qf_loss,
            snapshot.vf_loss,
            snapshot.alpha,
            elapsed
        );
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Fans snapshots out to several backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &EpochSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builders() {
        let snapshot = EpochSnapshot::new(10, 500, 10)
            .with_eval(2.5, 0.8)
            .with_losses(0.5, 0.3, 0.2)
            .with_alpha(0.1);

        assert_eq!(snapshot.epoch, 10);
        assert_eq!(snapshot.env_steps, 500);
        assert!((snapshot.mean_return - 2.5).abs() < 1e-6);
        assert!((snapshot.success_rate - 0.8).abs() < 1e-6);
        assert!((snapshot.qf_loss - 0.3).abs() < 1e-6);
        assert!((snapshot.alpha - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.csv");
        {
            let mut logger = CsvLogger::new(&path).unwrap();
            logger.log(&EpochSnapshot::new(0, 50, 1));
            logger.log(&EpochSnapshot::new(1, 100, 2));
            logger.flush();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,env_steps"));
        assert!(lines[1].starts_with("0,50,1"));
    }

    #[test]
    fn test_console_logger_interval() {
        let mut logger = ConsoleLogger::new(10);
        logger.log(&EpochSnapshot::new(0, 0, 0));
        // Within the interval, silently skipped.
        logger.log(&EpochSnapshot::new(5, 250, 5));
        logger.log(&EpochSnapshot::new(10, 500, 10));
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let mut multi = MultiLogger::new().add(ConsoleLogger::new(1));
        multi.log(&EpochSnapshot::new(0, 0, 0));
        multi.flush();
    }
}
