use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use std::fmt;
use tracing::info;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Cumulative request counts per client identifier.
#[derive(Default)]
pub struct AccessCounter {
    counts: DashMap<String, u64>,
}

impl AccessCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the count for `client` and returns the new total.
    pub fn record(&self, client: &str) -> u64 {
        let mut count = self.counts.entry(client.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, client: &str) -> u64 {
        self.counts.get(client).map(|c| *c).unwrap_or(0)
    }

    pub fn clients(&self) -> usize {
        self.counts.len()
    }
}

/// One screenshot attempt as written to the log.
#[derive(Debug)]
pub struct RequestEvent<'a> {
    pub request_id: &'a str,
    pub client: &'a str,
    pub count: u64,
    pub url: Option<&'a str>,
    pub device: Option<&'a str>,
    pub width: Option<&'a str>,
    pub height: Option<&'a str>,
}

pub fn log_request(event: &RequestEvent<'_>) {
    info!(
        request_id = event.request_id,
        client = event.client,
        count = event.count,
        url = event.url.unwrap_or("-"),
        device = event.device.unwrap_or("-"),
        width = event.width.unwrap_or("-"),
        height = event.height.unwrap_or("-"),
        "screenshot request"
    );
}

/// Log timestamp formatter bound to an IANA zone or a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct LogClock {
    zone: LogZone,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LogZone {
    Named(Tz),
    Fixed(FixedOffset),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTimezone(pub String);

impl fmt::Display for InvalidTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized timezone '{}', expected an IANA name like Europe/Zurich or an offset like +02:00", self.0)
    }
}

impl LogClock {
    pub fn utc() -> Self {
        Self {
            zone: LogZone::Fixed(Utc.fix()),
        }
    }

    /// Parses an IANA zone name (`Europe/Zurich`), `UTC`, `Z` or a
    /// `±HH:MM` / `±HHMM` / `±HH` offset.
    pub fn parse(timezone: &str) -> Result<Self, InvalidTimezone> {
        let tz = timezone.trim();
        if ["utc", "gmt", "z"].iter().any(|name| tz.eq_ignore_ascii_case(name)) {
            return Ok(Self::utc());
        }
        if let Ok(named) = tz.parse::<Tz>() {
            return Ok(Self {
                zone: LogZone::Named(named),
            });
        }
        let tz = tz
            .strip_prefix("UTC")
            .or_else(|| tz.strip_prefix("GMT"))
            .unwrap_or(tz);

        let invalid = || InvalidTimezone(timezone.to_string());
        let (sign, rest) = match tz.as_bytes().first() {
            Some(b'+') => (1, &tz[1..]),
            Some(b'-') => (-1, &tz[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let (hours, minutes) = match digits.len() {
            1 | 2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
            4 => (
                digits[..2].parse::<i32>().map_err(|_| invalid())?,
                digits[2..].parse::<i32>().map_err(|_| invalid())?,
            ),
            _ => return Err(invalid()),
        };
        if minutes >= 60 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(|offset| Self {
                zone: LogZone::Fixed(offset),
            })
            .ok_or_else(invalid)
    }

    /// Resolves the configured timezone, falling back to UTC.
    ///
    /// Returns the parse error alongside so it can be reported once the
    /// subscriber is installed.
    pub fn from_config(timezone: Option<&str>) -> (Self, Option<InvalidTimezone>) {
        match timezone.map(str::trim).filter(|tz| !tz.is_empty()) {
            None => (Self::utc(), None),
            Some(tz) => match Self::parse(tz) {
                Ok(clock) => (clock, None),
                Err(e) => (Self::utc(), Some(e)),
            },
        }
    }

    /// Current local time; named zones follow their DST rules.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.at(Utc::now())
    }

    pub fn at(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self.zone {
            LogZone::Named(tz) => instant.with_timezone(&tz).fixed_offset(),
            LogZone::Fixed(offset) => instant.with_timezone(&offset),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        *self.now().offset()
    }

    pub fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339()
    }
}

impl Default for LogClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl FormatTime for LogClock {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", self.now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}
