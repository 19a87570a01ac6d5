use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    host::{default_group, is_local, normalize_host, HostResolver},
    Error,
};

/// The value of a data point, as given by the caller.
///
/// Values are converted to a floating-point number when the data point is appended, so text values
/// are allowed as long as they parse as one.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A floating-point value.
    Float(f64),

    /// An integer value.
    Integer(i64),

    /// A textual value, such as one read from the command line.
    Text(String),
}

impl Value {
    fn to_finite_f64(&self) -> Option<f64> {
        let value = match self {
            Value::Float(v) => *v,
            Value::Integer(v) => *v as f64,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
        };

        value.is_finite().then_some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Value::Integer(v),
            Err(_) => Value::Float(v as f64),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Returns the number of seconds since the Unix epoch.
    pub const fn as_secs(self) -> i64 {
        self.0
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

impl From<i32> for Timestamp {
    fn from(secs: i32) -> Self {
        Self(i64::from(secs))
    }
}

impl From<u32> for Timestamp {
    fn from(secs: u32) -> Self {
        Self(i64::from(secs))
    }
}

impl From<f64> for Timestamp {
    /// Truncates fractional seconds toward zero.
    fn from(secs: f64) -> Self {
        Self(secs.trunc() as i64)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Self::from(since.as_secs()),
            Err(e) => Self(-i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX)),
        }
    }
}

/// A data point, as given by the caller.
///
/// Only the metric name and the value are required. Everything else is filled in when the point
/// is appended to a [`CarbonClient`][crate::CarbonClient]:
///
/// - a missing host, or a host of `localhost`, becomes the name of the local host
/// - a fully-qualified host is cut down to its first label, unless it looks like an IP address
/// - a missing group becomes `systems.<first character of the host>`
/// - a missing timestamp becomes the current time
#[derive(Clone, Debug)]
pub struct Point {
    group: Option<String>,
    host: Option<String>,
    metric: String,
    value: Option<Value>,
    timestamp: Option<Timestamp>,
}

impl Point {
    /// Creates a new `Point` for the given metric, with no value.
    pub fn new<S: Into<String>>(metric: S) -> Self {
        Self { group: None, host: None, metric: metric.into(), value: None, timestamp: None }
    }

    /// Sets the value.
    #[must_use]
    pub fn with_value<V: Into<Value>>(mut self, value: V) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the group, which prefixes the host in the metric path.
    #[must_use]
    pub fn with_group<S: Into<String>>(mut self, group: S) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the host the data point was observed on.
    #[must_use]
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp<T: Into<Timestamp>>(mut self, timestamp: T) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Returns the metric name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Fills in all defaults and validates the value.
    ///
    /// # Errors
    ///
    /// If the value is missing, [`Error::MissingValue`] is returned. If it cannot be converted to a
    /// finite floating-point number, [`Error::InvalidValue`] is returned.
    pub fn resolve(self, resolver: &dyn HostResolver) -> Result<DataPoint, Error> {
        let value = match &self.value {
            None => return Err(Error::MissingValue { metric: self.metric }),
            Some(value) => value.to_finite_f64().ok_or_else(|| Error::InvalidValue {
                metric: self.metric.clone(),
                value: value.to_string(),
            })?,
        };

        let host = match self.host {
            Some(host) if !is_local(&host) => host,
            _ => resolver.host_name(),
        };
        let host = normalize_host(&host).to_owned();

        let group = match self.group {
            Some(group) if !group.is_empty() => group,
            _ => default_group(&host),
        };

        Ok(DataPoint {
            group,
            host,
            metric: self.metric,
            value,
            timestamp: self.timestamp.unwrap_or_else(Timestamp::now),
        })
    }
}

/// A fully resolved data point, ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint {
    group: String,
    host: String,
    metric: String,
    value: f64,
    timestamp: Timestamp,
}

impl DataPoint {
    /// Returns the group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the host, with any domain stripped.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the metric name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Returns the value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}
