use std::collections::HashMap;

use carbon_client::{bulk_update, CarbonBuilder, Point};

fn main() {
    tracing_subscriber::fmt::init();

    let builder = CarbonBuilder::new()
        .with_server("localhost")
        .with_port(2003)
        .with_debug(true)
        .with_batch_size(100);

    let mut client = builder.clone().build().expect("failed to build carbon client");
    client
        .append(Point::new("example.single").with_group("examples").with_value(42))
        .expect("failed to append data point");
    client.submit().expect("failed to submit data point");
    client.disconnect().expect("failed to disconnect");

    let data: HashMap<String, f64> =
        (0..1_000).map(|i| (format!("example.series_{i}"), f64::from(i) / 10.0)).collect();
    let stats = bulk_update(builder, Some("examples"), None, data).expect("failed to send bulk update");

    println!(
        "sent {} data points in {} payloads ({} bytes)",
        stats.lines_sent(),
        stats.payloads_sent(),
        stats.bytes_sent()
    );
}
