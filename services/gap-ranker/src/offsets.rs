//! Start-position seeking
//!
//! Before consuming, every assigned partition is moved to the first record
//! whose timestamp is at or after a target instant. Without an explicit
//! target the consumer starts from local midnight of the current day, so a
//! restarted service rebuilds today's state from the raw topic.

use chrono::{DateTime, FixedOffset, Local, NaiveTime, Offset, TimeZone};
use tracing::{debug, info};

use crate::transport::{SeekableConsumer, TopicPartition, TransportError};

/// Outcome of a seek pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekReport {
    pub target: DateTime<FixedOffset>,
    /// Partitions moved, with the offset each now points at
    pub seeked: Vec<(TopicPartition, u64)>,
    /// Partitions with no record at or after the target, left where they
    /// were, with the position each still reads from
    pub untouched: Vec<(TopicPartition, u64)>,
}

/// Midnight at the start of `now`'s calendar day, in `now`'s zone.
///
/// If midnight does not exist locally (a DST gap at 00:00), the earliest valid
/// mapping is used; failing that, midnight at `now`'s current offset.
pub fn start_of_local_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<FixedOffset> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(t) => t.fixed_offset(),
        None => {
            let offset = now.offset().fix();
            offset
                .from_local_datetime(&midnight)
                .single()
                .unwrap_or_else(|| now.fixed_offset())
        }
    }
}

/// Seek every assigned partition to `target`, or to local midnight today.
pub async fn seek_to_time<C>(
    consumer: &mut C,
    target: Option<DateTime<FixedOffset>>,
) -> Result<SeekReport, TransportError>
where
    C: SeekableConsumer + ?Sized,
{
    let target = target.unwrap_or_else(|| start_of_local_day(&Local::now()));
    let target_ms = target.timestamp_millis();

    let mut report = SeekReport {
        target,
        seeked: Vec::new(),
        untouched: Vec::new(),
    };

    for tp in consumer.assignment().await? {
        match consumer.offset_for_time(&tp, target_ms).await? {
            Some(offset) => {
                consumer.seek(&tp, offset).await?;
                debug!(partition = %tp, offset, "Seeked partition");
                report.seeked.push((tp, offset));
            }
            None => {
                let position = consumer.position(&tp).await?;
                debug!(partition = %tp, position, "No record at or after target");
                report.untouched.push((tp, position));
            }
        }
    }

    info!(
        target = %report.target,
        seeked = report.seeked.len(),
        untouched = report.untouched.len(),
        "Start offsets resolved"
    );
    Ok(report)
}
