//! Geolocation lookups against local MMDB databases
//!
//! Country and ASN readers are independent; a missing or unreadable database
//! file simply disables that lookup and every failure falls back to the
//! defaults ("XX", no organization).

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Country ISO code sentinel for failed lookups
pub const UNKNOWN_COUNTRY: &str = "XX";

/// GeoIP lookups for country code and ASN organization
pub struct GeoLocator {
    country: Option<Arc<Reader<Vec<u8>>>>,
    asn: Option<Arc<Reader<Vec<u8>>>>,
}

impl GeoLocator {
    /// A locator with all lookups disabled
    pub fn disabled() -> Self {
        Self {
            country: None,
            asn: None,
        }
    }

    /// Open the databases that exist; the others stay disabled
    pub fn open(country_path: Option<&Path>, asn_path: Option<&Path>) -> Self {
        Self {
            country: Self::open_reader(country_path),
            asn: Self::open_reader(asn_path),
        }
    }

    fn open_reader(path: Option<&Path>) -> Option<Arc<Reader<Vec<u8>>>> {
        let path = path?;
        match Reader::open_readfile(path) {
            Ok(reader) => Some(Arc::new(reader)),
            Err(e) => {
                log::warn!("Failed to open GeoIP database {}: {e}", path.display());
                None
            }
        }
    }

    pub fn has_country_db(&self) -> bool {
        self.country.is_some()
    }

    /// Country ISO code (default "XX") and ASN organization (default `None`)
    /// for an IP address string
    pub fn info(&self, ip_str: &str) -> (String, Option<String>) {
        let ip: IpAddr = match ip_str.parse() {
            Ok(ip) => ip,
            Err(_) => return (UNKNOWN_COUNTRY.to_string(), None),
        };

        let country = self
            .country
            .as_ref()
            .and_then(|reader| Self::lookup_country(reader, ip))
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());
        let asn = self
            .asn
            .as_ref()
            .and_then(|reader| Self::lookup_asn(reader, ip));

        (country, asn)
    }

    fn lookup_country(reader: &Reader<Vec<u8>>, ip: IpAddr) -> Option<String> {
        let lookup_result = reader.lookup(ip).ok()?;
        let country: Option<geoip2::Country> = lookup_result.decode().ok()?;
        country?.country.iso_code.map(String::from)
    }

    fn lookup_asn(reader: &Reader<Vec<u8>>, ip: IpAddr) -> Option<String> {
        let lookup_result = reader.lookup(ip).ok()?;
        let asn: Option<geoip2::Asn> = lookup_result.decode().ok()?;
        asn?.autonomous_system_organization.map(String::from)
    }
}

impl Clone for GeoLocator {
    fn clone(&self) -> Self {
        Self {
            country: self.country.as_ref().map(Arc::clone),
            asn: self.asn.as_ref().map(Arc::clone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_locator_returns_defaults() {
        let geo = GeoLocator::disabled();
        assert!(!geo.has_country_db());
        assert_eq!(geo.info("8.8.8.8"), (UNKNOWN_COUNTRY.to_string(), None));
    }

    #[test]
    fn test_invalid_ip_returns_defaults() {
        let geo = GeoLocator::disabled();
        assert_eq!(geo.info("not-an-ip"), (UNKNOWN_COUNTRY.to_string(), None));
    }

    #[test]
    fn test_missing_database_file_is_disabled() {
        let geo = GeoLocator::open(
            Some(Path::new("/nonexistent/GeoLite2-Country.mmdb")),
            None,
        );
        assert!(!geo.has_country_db());
        assert_eq!(geo.info("8.8.8.8").0, UNKNOWN_COUNTRY);
    }
}
