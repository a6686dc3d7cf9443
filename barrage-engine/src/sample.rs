//! Per-request samples recorded by the execution pool

use crate::plan::Phase;
use barrage_http::{Milestones, ResponseHeaders};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Timing of one dispatched request, in seconds.
///
/// Milestones are cumulative from the request's own start. A milestone that
/// was never reached is 0; that alone does not mean the request failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleTiming {
    pub index: usize,
    pub dns: f64,
    pub connect: f64,
    pub tls: f64,
    pub first_byte: f64,
    pub total: f64,
    /// Seconds from run start to this request's completion
    pub elapsed: f64,
    pub phase: Option<Phase>,
}

impl SampleTiming {
    pub fn from_milestones(
        index: usize,
        milestones: Milestones,
        elapsed: f64,
        phase: Option<Phase>,
    ) -> Self {
        Self {
            index,
            dns: milestones.dns.max(0.0),
            connect: milestones.connect.max(0.0),
            tls: milestones.tls.max(0.0),
            first_byte: milestones.first_byte.max(0.0),
            total: milestones.total.max(0.0),
            elapsed: elapsed.max(0.0),
            phase,
        }
    }

    /// Split the cumulative milestones into non-overlapping legs
    pub fn legs(&self) -> TimingLegs {
        let handshake_done = self.tls.max(self.connect);
        TimingLegs {
            dns: self.dns,
            tcp: (self.connect - self.dns).max(0.0),
            tls: (self.tls - self.connect).max(0.0),
            server: if self.first_byte > 0.0 {
                (self.first_byte - handshake_done).max(0.0)
            } else {
                0.0
            },
            download: if self.first_byte > 0.0 {
                (self.total - self.first_byte).max(0.0)
            } else {
                0.0
            },
            total: self.total,
        }
    }
}

/// Duration of each stage of one request, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingLegs {
    pub dns: f64,
    pub tcp: f64,
    pub tls: f64,
    pub server: f64,
    pub download: f64,
    pub total: f64,
}

/// What came back for one dispatched request
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseOutcome {
    pub index: usize,
    /// HTTP status, 0 when the transport failed
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body_size: usize,
    /// Raw body, kept only where the pool's retention policy asks for it
    pub body: Option<Bytes>,
    pub error: Option<String>,
}

impl ResponseOutcome {
    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            status: 0,
            headers: ResponseHeaders::new(),
            body_size: 0,
            body: None,
            error: Some(error.into()),
        }
    }

    /// 2xx and 3xx count as success
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// Failed before any HTTP status was received
    pub fn is_transport_failure(&self) -> bool {
        self.status == 0 && self.error.is_some()
    }
}

pub fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(dns: f64, connect: f64, tls: f64, first_byte: f64, total: f64) -> SampleTiming {
        SampleTiming {
            index: 0,
            dns,
            connect,
            tls,
            first_byte,
            total,
            elapsed: total,
            phase: None,
        }
    }

    #[test]
    fn test_legs_split_cumulative_milestones() {
        let legs = timing(0.01, 0.03, 0.06, 0.16, 0.2).legs();
        assert!((legs.dns - 0.01).abs() < 1e-9);
        assert!((legs.tcp - 0.02).abs() < 1e-9);
        assert!((legs.tls - 0.03).abs() < 1e-9);
        assert!((legs.server - 0.10).abs() < 1e-9);
        assert!((legs.download - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_reused_connection_charges_wait_to_server() {
        let legs = timing(0.0, 0.0, 0.0, 0.05, 0.06).legs();
        assert_eq!(legs.dns, 0.0);
        assert_eq!(legs.tcp, 0.0);
        assert!((legs.server - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_failed_request_has_no_server_leg() {
        let legs = timing(0.01, 0.0, 0.0, 0.0, 5.0).legs();
        assert_eq!(legs.tcp, 0.0);
        assert_eq!(legs.server, 0.0);
        assert_eq!(legs.download, 0.0);
        assert_eq!(legs.total, 5.0);
    }

    #[test]
    fn test_success_status_range() {
        assert!(is_success_status(200));
        assert!(is_success_status(302));
        assert!(!is_success_status(404));
        assert!(!is_success_status(0));
        assert!(ResponseOutcome::failed(3, "refused").is_transport_failure());
    }
}
