use time::format_description::well_known::Rfc3339;

pub trait TimeSource {
    // Return an RFC 3339 timestamp
    fn current_time(&self) -> String;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> String {
        let time = time::OffsetDateTime::now_utc();

        // Formatting a UTC timestamp as RFC 3339 cannot fail
        time.format(&Rfc3339).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn system_time_is_rfc3339() {
        let now = SystemTime {}.current_time();
        assert!(OffsetDateTime::parse(&now, &Rfc3339).is_ok());
    }
}
