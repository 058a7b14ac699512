//! Sample source, state sink, and the dead reckoning driver loop.
//!
//! Nothing in this module is needed to use the integrator. It provides the collaborators that sit around
//! it when replaying a recorded log:
//! - [ImuTextReader]: reads the whitespace separated text log, one `IMU t gx gy gz ax ay az` record per
//!   line, skipping other record kinds (`ODOM`, `GNSS`, ...) that may be interleaved in the same file.
//! - [StateSink] / [StateWriter]: receives the navigation state after each accepted sample and writes
//!   `t px py pz qw qx qy qz vx vy vz` lines.
//! - [NavigationResult]: an in-memory sink, handy for tests and post-run analysis.
//! - [dead_reckoning]: feeds samples through a [StrapdownIntegrator] into a sink and tallies outcomes.
use log::{info, warn};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::integrator::{IngestOutcome, StrapdownIntegrator};
use crate::{ImuSample, NavState};

/// Record tag marking an IMU line in the text log.
pub const IMU_TAG: &str = "IMU";

/// Errors raised while reading the text sample log.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read sample log: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed IMU record on line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}

/// Reader for the text IMU log.
///
/// Lines are space separated. Only lines whose first field is `IMU` are parsed, the remaining seven
/// fields being timestamp (s), gyroscope x/y/z (rad/s), and accelerometer x/y/z (m/s^2). Blank lines,
/// `#` comments, and other record kinds are skipped. Samples are produced lazily in file order.
pub struct ImuTextReader<R: io::Read> {
    reader: csv::Reader<R>,
}
impl ImuTextReader<File> {
    /// Open a log file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        Ok(Self::from_reader(File::open(path).map_err(csv::Error::from)?))
    }
}
impl<R: io::Read> ImuTextReader<R> {
    pub fn from_reader(reader: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);
        ImuTextReader { reader }
    }
    /// Iterate over the IMU samples in file order.
    pub fn samples(&mut self) -> impl Iterator<Item = Result<ImuSample, SourceError>> + '_ {
        self.reader
            .records()
            .filter_map(|record| match record {
                Ok(record) => parse_imu_record(&record).transpose(),
                Err(e) => Some(Err(SourceError::from(e))),
            })
    }
    /// Hand every IMU sample to `handler`, in order. Stops at the first read error.
    ///
    /// # Returns
    /// The number of samples delivered.
    pub fn for_each_imu<F>(&mut self, mut handler: F) -> Result<usize, SourceError>
    where
        F: FnMut(&ImuSample),
    {
        let mut count = 0;
        for sample in self.samples() {
            handler(&sample?);
            count += 1;
        }
        Ok(count)
    }
}

/// Parse one log record. `Ok(None)` for records that are not IMU samples.
fn parse_imu_record(record: &csv::StringRecord) -> Result<Option<ImuSample>, SourceError> {
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    // Repeated spaces show up as empty fields
    let mut fields = record.iter().filter(|f| !f.is_empty());
    match fields.next() {
        Some(IMU_TAG) => {}
        _ => return Ok(None),
    }
    let values = fields
        .map(|f| f.parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| SourceError::Malformed {
            line,
            reason: e.to_string(),
        })?;
    ImuSample::try_from(values.as_slice())
        .map(Some)
        .map_err(|reason| SourceError::Malformed {
            line,
            reason: format!("{} (found {})", reason, values.len()),
        })
}

/// Consumer of navigation states produced during a run.
pub trait StateSink {
    /// Called once with the state after each accepted sample.
    fn record(&mut self, state: &NavState) -> io::Result<()>;
}

/// Writes one text line per state: `t px py pz qw qx qy qz vx vy vz`.
pub struct StateWriter<W: io::Write> {
    writer: csv::Writer<W>,
}
impl StateWriter<File> {
    /// Create (or truncate) the output file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::from_writer(File::create(path)?))
    }
}
impl<W: io::Write> StateWriter<W> {
    pub fn from_writer(writer: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_writer(writer);
        StateWriter { writer }
    }
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}
impl<W: io::Write> StateSink for StateWriter<W> {
    fn record(&mut self, state: &NavState) -> io::Result<()> {
        let Some(timestamp) = state.timestamp else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot record a state without a timestamp",
            ));
        };
        let values: Vec<f64> = state.into();
        let row = std::iter::once(timestamp)
            .chain(values)
            .map(|x| x.to_string());
        self.writer.write_record(row).map_err(io::Error::from)
    }
}

/// In-memory record of a navigation run.
#[derive(Debug, Clone, Default)]
pub struct NavigationResult {
    /// Name or identifier for this navigation solution
    pub name: String,
    /// States in the order they were recorded
    pub states: Vec<NavState>,
}
impl NavigationResult {
    pub fn new(name: &str) -> Self {
        NavigationResult {
            name: name.to_string(),
            states: Vec::new(),
        }
    }
    pub fn final_state(&self) -> Option<&NavState> {
        self.states.last()
    }
    /// Write every state in the state record format.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = StateWriter::create(path)?;
        for state in &self.states {
            writer.record(state)?;
        }
        writer.flush()
    }
    /// Read states back from a file written by [StateWriter].
    pub fn from_file<P: AsRef<Path>>(path: P, name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_path(path)?;
        let mut result = NavigationResult::new(name);
        for record in rdr.records() {
            let record = record?;
            if record.len() != 11 {
                return Err(format!("state record has {} fields, expected 11", record.len()).into());
            }
            let v = record
                .iter()
                .map(|f| f.parse::<f64>())
                .collect::<Result<Vec<f64>, _>>()?;
            result.states.push(NavState {
                timestamp: Some(v[0]),
                position: Vector3::new(v[1], v[2], v[3]),
                orientation: UnitQuaternion::new_normalize(Quaternion::new(v[4], v[5], v[6], v[7])),
                velocity: Vector3::new(v[8], v[9], v[10]),
            });
        }
        Ok(result)
    }
}
impl StateSink for NavigationResult {
    fn record(&mut self, state: &NavState) -> io::Result<()> {
        self.states.push(*state);
        Ok(())
    }
}

/// Tally of what happened to the samples of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    /// Samples accepted by the integrator (baseline, propagated, and gap samples)
    pub ingested: usize,
    /// Samples that advanced the state
    pub propagated: usize,
    /// Samples that arrived after a gap and only re-anchored the timestamp
    pub gaps: usize,
    /// Samples refused by the integrator
    pub rejected: usize,
    /// State after the last accepted sample
    pub final_state: NavState,
}

/// Run open-loop dead reckoning over a sequence of samples.
///
/// Every sample is offered to the integrator. Accepted samples are followed by exactly one call to
/// `sink.record` with the updated state. Rejected samples are logged, counted, and skipped; they do not
/// stop the run.
///
/// # Errors
/// Only sink failures end the run early. The sample whose state failed to record has already been
/// integrated, so on error the integrator is one step ahead of the last state the sink holds.
pub fn dead_reckoning<I, S>(
    samples: I,
    integrator: &mut StrapdownIntegrator,
    sink: &mut S,
) -> io::Result<RunSummary>
where
    I: IntoIterator<Item = ImuSample>,
    S: StateSink + ?Sized,
{
    let mut summary = RunSummary::default();
    for sample in samples {
        let mut recorded = Ok(());
        match integrator.ingest_with(&sample, |state| recorded = sink.record(state)) {
            Ok(outcome) => {
                summary.ingested += 1;
                match outcome {
                    IngestOutcome::Initialized => {}
                    IngestOutcome::Propagated { .. } => summary.propagated += 1,
                    IngestOutcome::GapSkipped { .. } => summary.gaps += 1,
                }
            }
            Err(e) => {
                warn!("skipping sample at {} s: {}", sample.timestamp, e);
                summary.rejected += 1;
            }
        }
        recorded?;
    }
    summary.final_state = integrator.state();
    info!(
        "dead reckoning finished: {} ingested, {} propagated, {} gaps, {} rejected",
        summary.ingested, summary.propagated, summary.gaps, summary.rejected
    );
    Ok(summary)
}
