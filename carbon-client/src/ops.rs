use tracing::{debug, warn};

use crate::{
    point::{Point, Value},
    CarbonBuilder, CarbonClient, Error, SessionStats,
};

/// Sends a single data point and disconnects.
///
/// # Errors
///
/// If the data point is invalid, [`Error::MissingValue`] or [`Error::InvalidValue`] is returned
/// before any connection is made. If connecting or writing fails, [`Error::Connection`] is returned.
pub fn update(builder: CarbonBuilder, point: Point) -> Result<(), Error> {
    let mut client = builder.build()?;
    client.append(point)?;
    client.submit()?;
    client.disconnect()
}

/// Sends many data points under a shared group and host, and disconnects.
///
/// Data points are sent in payloads of at most [`CarbonBuilder::with_batch_size`] lines, each one
/// written as soon as it is full. Iteration order of `data` carries no meaning: every entry is an
/// independent data point timestamped with the current time.
///
/// Returns what the session sent.
///
/// # Errors
///
/// If a value is missing or invalid, or if connecting or writing fails, the error is returned
/// right away. Payloads that were already written stay written, and every data point that was
/// not yet written is discarded, so nothing is sent after the error no matter the batch size.
pub fn bulk_update<I, K, V>(
    builder: CarbonBuilder,
    group: Option<&str>,
    host: Option<&str>,
    data: I,
) -> Result<SessionStats, Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let batch_size = builder.batch_size();
    let mut client = builder.build()?;

    if let Err(e) = send_all(&mut client, batch_size, group, host, data) {
        let discarded = client.discard_pending();
        warn!(
            address = %client.address(),
            sent = client.stats().lines_sent(),
            discarded,
            error = %e,
            "Bulk update failed, data points that were not sent yet were discarded."
        );
        return Err(e);
    }

    let stats = client.stats();
    debug!(
        address = %client.address(),
        payloads = stats.payloads_sent(),
        lines = stats.lines_sent(),
        "Finished bulk update."
    );
    Ok(stats)
}

fn send_all<I, K, V>(
    client: &mut CarbonClient,
    batch_size: usize,
    group: Option<&str>,
    host: Option<&str>,
    data: I,
) -> Result<(), Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    for (metric, value) in data {
        let mut point = Point::new(metric).with_value(value);
        if let Some(group) = group {
            point = point.with_group(group);
        }
        if let Some(host) = host {
            point = point.with_host(host);
        }

        client.append(point)?;
        if client.pending() >= batch_size {
            client.submit()?;
        }
    }

    client.submit()?;
    client.disconnect()
}
