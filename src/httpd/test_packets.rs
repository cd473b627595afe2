use crate::streamer::{self, TEST_PACKET_INTERVAL, TEST_PACKET_PORT};
use anyhow::{Context, Result};
use axum::{extract::RawQuery, http::StatusCode};
use std::net::{Ipv4Addr, SocketAddr};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct TestPacketsRequest {
    destination: SocketAddr,
    count: u32,
}

fn param<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim())
}

impl TestPacketsRequest {
    fn from_query(query: &str) -> Result<TestPacketsRequest> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
        let ip = param(&pairs, "ip").filter(|ip| !ip.is_empty());
        let count = param(&pairs, "n")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|&n| n > 0);
        let (Some(ip), Some(count)) = (ip, count) else {
            anyhow::bail!("Invalid parameters. QUERY_STRING: {query}");
        };
        let ip: Ipv4Addr = ip
            .parse()
            .with_context(|| format!("invalid IP address {ip:?}"))?;
        let port = match param(&pairs, "port") {
            Some(port) => port
                .parse()
                .with_context(|| format!("invalid port {port:?}"))?,
            None => TEST_PACKET_PORT,
        };
        Ok(TestPacketsRequest {
            destination: SocketAddr::from((ip, port)),
            count,
        })
    }
}

pub async fn get_send_udp_packet(
    RawQuery(query): RawQuery,
) -> Result<String, (StatusCode, String)> {
    let query = query.unwrap_or_default();
    let request = TestPacketsRequest::from_query(&query).map_err(|err| {
        tracing::warn!("rejected test packet request: {err:#}");
        (StatusCode::BAD_REQUEST, format!("{err:#}\n"))
    })?;
    let sent =
        streamer::send_test_packets(request.destination, request.count, TEST_PACKET_INTERVAL)
            .await
            .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}\n")))?;
    Ok(format!(
        "Sending {} packets to {}...\nSent {sent} of {} packets.\nFinished sending packets.\n",
        request.count, request.destination, request.count
    ))
}
