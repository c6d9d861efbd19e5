//! Rate-limited reverse geocoding with a persistent cache.
//!
//! Coordinates are rounded to three decimal places (about 100 m) before
//! lookup so nearby photos share cache entries. Negative results are cached
//! too; a lookup that found nothing is not worth repeating.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::collaborators::{GeocodedPlace, ReverseGeocoder};

const GEOCODE_CACHE_FILE: &str = "geocode_cache.json";

/// Nominatim-style services allow at most one request per second.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Save after this many new cache entries; a final save happens on shutdown.
const SAVE_EVERY: usize = 10;

struct CacheState {
    entries: HashMap<String, Option<String>>,
    new_since_save: usize,
}

/// Singleton geocoding service: one instance is constructed during lifecycle
/// init and shared by every consumer.
pub struct GeocodeService {
    geocoder: Arc<dyn ReverseGeocoder>,
    path: PathBuf,
    cache: Mutex<CacheState>,
    /// Serializes lookups and enforces the request interval; held across the
    /// pacing sleep so concurrent callers queue up behind it.
    last_request: Mutex<Option<Instant>>,
}

impl GeocodeService {
    pub fn new(cache_dir: &Path, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        let path = cache_dir.join(GEOCODE_CACHE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, Option<String>>>(&raw) {
                Ok(entries) => {
                    tracing::info!("loaded {} cached geocode results", entries.len());
                    entries
                }
                Err(e) => {
                    tracing::warn!("failed to parse geocode cache: {e}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        GeocodeService {
            geocoder,
            path,
            cache: Mutex::new(CacheState {
                entries,
                new_since_save: 0,
            }),
            last_request: Mutex::new(None),
        }
    }

    /// Convert coordinates to a display string like "Boulder, CO" or
    /// "Paris, France". Returns `None` when nothing useful is known; that
    /// outcome is cached as firmly as a hit.
    pub fn reverse(&self, latitude: f64, longitude: f64) -> Option<String> {
        let key = cache_key(latitude, longitude);

        {
            let cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.entries.get(&key) {
                return cached.clone();
            }
        }

        {
            let mut last = self.last_request.lock().unwrap();
            if let Some(at) = *last {
                let elapsed = at.elapsed();
                if elapsed < MIN_REQUEST_INTERVAL {
                    std::thread::sleep(MIN_REQUEST_INTERVAL - elapsed);
                }
            }
            *last = Some(Instant::now());
        }

        let result = match self.geocoder.reverse(latitude, longitude) {
            Ok(place) => place.and_then(format_place),
            Err(e) => {
                tracing::debug!("reverse geocoding failed: {e}");
                None
            }
        };

        let mut cache = self.cache.lock().unwrap();
        cache.entries.insert(key, result.clone());
        cache.new_since_save += 1;
        if cache.new_since_save >= SAVE_EVERY {
            self.save_locked(&mut cache);
        }

        result
    }

    /// Persist the cache now; also called on orderly shutdown.
    pub fn save(&self) {
        let mut cache = self.cache.lock().unwrap();
        self.save_locked(&mut cache);
    }

    fn save_locked(&self, cache: &mut CacheState) {
        match serde_json::to_string(&cache.entries) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(&self.path, serialized) {
                    tracing::warn!("failed to save geocode cache: {e}");
                } else {
                    cache.new_since_save = 0;
                }
            }
            Err(e) => tracing::warn!("failed to serialize geocode cache: {e}"),
        }
    }
}

fn cache_key(latitude: f64, longitude: f64) -> String {
    format!("{latitude:.3},{longitude:.3}")
}

/// US results use "City, ST"; everywhere else "City, Country"; degraded
/// forms when only part of the address is known.
fn format_place(place: GeocodedPlace) -> Option<String> {
    let GeocodedPlace {
        city,
        state,
        country,
        country_code,
    } = place;

    if country_code.as_deref() == Some("US")
        && let (Some(city), Some(state)) = (&city, &state)
    {
        return Some(format!("{city}, {}", us_state_abbrev(state)));
    }
    match (city, country) {
        (Some(city), Some(country)) => Some(format!("{city}, {country}")),
        (Some(city), None) => Some(city),
        (None, Some(country)) => Some(country),
        (None, None) => None,
    }
}

/// Full state name to postal abbreviation; unknown names pass through.
fn us_state_abbrev(state: &str) -> &str {
    match state {
        "Alabama" => "AL",
        "Alaska" => "AK",
        "Arizona" => "AZ",
        "Arkansas" => "AR",
        "California" => "CA",
        "Colorado" => "CO",
        "Connecticut" => "CT",
        "Delaware" => "DE",
        "Florida" => "FL",
        "Georgia" => "GA",
        "Hawaii" => "HI",
        "Idaho" => "ID",
        "Illinois" => "IL",
        "Indiana" => "IN",
        "Iowa" => "IA",
        "Kansas" => "KS",
        "Kentucky" => "KY",
        "Louisiana" => "LA",
        "Maine" => "ME",
        "Maryland" => "MD",
        "Massachusetts" => "MA",
        "Michigan" => "MI",
        "Minnesota" => "MN",
        "Mississippi" => "MS",
        "Missouri" => "MO",
        "Montana" => "MT",
        "Nebraska" => "NE",
        "Nevada" => "NV",
        "New Hampshire" => "NH",
        "New Jersey" => "NJ",
        "New Mexico" => "NM",
        "New York" => "NY",
        "North Carolina" => "NC",
        "North Dakota" => "ND",
        "Ohio" => "OH",
        "Oklahoma" => "OK",
        "Oregon" => "OR",
        "Pennsylvania" => "PA",
        "Rhode Island" => "RI",
        "South Carolina" => "SC",
        "South Dakota" => "SD",
        "Tennessee" => "TN",
        "Texas" => "TX",
        "Utah" => "UT",
        "Vermont" => "VT",
        "Virginia" => "VA",
        "Washington" => "WA",
        "West Virginia" => "WV",
        "Wisconsin" => "WI",
        "Wyoming" => "WY",
        "District of Columbia" => "DC",
        other => other,
    }
}
