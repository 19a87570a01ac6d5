use std::{env, process::ExitCode};

use carbon_client::{update, CarbonBuilder, Error, Point, Timestamp};
use getopts::{Matches, Options};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

const DEFAULT_CARBON_SERVER: &str = "carbon";
const DEFAULT_CARBON_PORT: u16 = 2003;
const DEFAULT_HOST: &str = "localhost";

/// Reasons for the process to exit unsuccessfully.
///
/// Each one maps to its own exit code so that callers can tell them apart.
#[derive(Debug, PartialEq, Eq)]
enum Failure {
    Usage(String),
    MissingMetric,
    MissingValue(String),
    InvalidValue,
    Connection,
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Usage(_) => 1,
            Failure::MissingMetric => 2,
            Failure::MissingValue(_) => 3,
            Failure::InvalidValue => 4,
            Failure::Connection => 5,
        }
    }
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        match e {
            Error::MissingValue { metric } => Failure::MissingValue(metric),
            Error::InvalidValue { .. } => Failure::InvalidValue,
            Error::InvalidBatchSize => Failure::Usage(e.to_string()),
            Error::Connection { .. } => Failure::Connection,
        }
    }
}

#[derive(Debug, PartialEq)]
struct Args {
    carbon_server: String,
    carbon_port: u16,
    group: Option<String>,
    host: String,
    metric: String,
    value: String,
    timestamp: Option<Timestamp>,
    debug: bool,
}

impl Args {
    fn from_matches(matches: &Matches) -> Result<Args, Failure> {
        let metric = matches.opt_str("metric").filter(|m| !m.is_empty()).ok_or(Failure::MissingMetric)?;
        let value = matches
            .opt_str("value")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Failure::MissingValue(metric.clone()))?;

        let carbon_port = match matches.opt_str("port") {
            Some(port) => port
                .parse()
                .map_err(|_| Failure::Usage(format!("invalid port '{port}'")))?,
            None => DEFAULT_CARBON_PORT,
        };

        let timestamp = match matches.opt_str("time") {
            Some(time) => Some(parse_timestamp(&time)?),
            None => None,
        };

        Ok(Args {
            carbon_server: matches
                .opt_str("carbonserver")
                .unwrap_or_else(|| DEFAULT_CARBON_SERVER.to_owned()),
            carbon_port,
            group: matches.opt_str("group"),
            host: matches.opt_str("server").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            metric,
            value,
            timestamp,
            debug: matches.opt_present("debug"),
        })
    }

    fn into_update(self) -> (CarbonBuilder, Point) {
        let builder = CarbonBuilder::new()
            .with_server(self.carbon_server)
            .with_port(self.carbon_port)
            .with_debug(self.debug);

        let mut point = Point::new(self.metric).with_host(self.host).with_value(self.value);
        if let Some(group) = self.group {
            point = point.with_group(group);
        }
        if let Some(timestamp) = self.timestamp {
            point = point.with_timestamp(timestamp);
        }

        (builder, point)
    }
}

fn parse_timestamp(time: &str) -> Result<Timestamp, Failure> {
    if let Ok(secs) = time.parse::<i64>() {
        return Ok(Timestamp::from(secs));
    }

    match time.parse::<f64>() {
        Ok(secs) if secs.is_finite() => Ok(Timestamp::from(secs)),
        _ => Err(Failure::Usage(format!("invalid time '{time}'"))),
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!(
        "Usage: {program} [-d] [-c carbonserver] [-p port] [-g group] [-s server] -m metric -v value\n\n\
         Default carbon server:\t{DEFAULT_CARBON_SERVER}:{DEFAULT_CARBON_PORT}\n\
         Default group:\t\tsystems.<first letter of the server>"
    );
    print!("{}", opts.usage(&brief));
}

fn print_example(program: &str) {
    println!("example: {program} -m random_int -v 24");
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("c", "carbonserver", "carbon server to send the data point to", "CARBONSERVER");
    opts.optopt("p", "port", "port the carbon server listens on", "PORT");
    opts.optopt("g", "group", "group that collects related servers together", "GROUP");
    opts.optopt("s", "server", "server or service the data point was collected on", "SERVER");
    opts.optopt("m", "metric", "name of the metric", "METRIC");
    opts.optopt("v", "value", "value of the data point", "VALUE");
    opts.optopt("t", "time", "time of the data point, in seconds since the epoch", "EPOCH");
    opts.optflag("d", "debug", "turn on debug output");
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(args: Args) -> Result<(), Failure> {
    debug!(?args, "Sending data point.");

    let (builder, point) = args.into_update();
    update(builder, point).map_err(|e| {
        error!(error = %e, "Failed to send data point.");
        Failure::from(e)
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("carbon-cli", String::as_str);
    let opts = opts();

    let matches = match opts.parse(args.get(1..).unwrap_or_default()) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("Failed to parse command line args: {f}");
            return ExitCode::from(Failure::Usage(f.to_string()).exit_code());
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return ExitCode::SUCCESS;
    }

    init_logging(matches.opt_present("debug"));

    let result = Args::from_matches(&matches).and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            match &failure {
                Failure::MissingMetric => {
                    print_usage(program, &opts);
                    println!("missing the name of the metric, -m METRIC_NAME.");
                    print_example(program);
                }
                Failure::MissingValue(metric) => {
                    print_usage(program, &opts);
                    println!("missing the value for {metric}, -v VALUE.");
                    print_example(program);
                }
                Failure::Usage(reason) => eprintln!("{reason}"),
                Failure::InvalidValue | Failure::Connection => {}
            }

            ExitCode::from(failure.exit_code())
        }
    }
}
