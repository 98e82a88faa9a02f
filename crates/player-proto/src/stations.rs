use std::path::Path;

use tracing::{info, warn};

use crate::protocol::RadioStation;

/// The hand-curated list shipped with the player, in traversal order.
const BUILTIN_STATIONS: &[(&str, &str, &str)] = &[
    ("Lofi Girl", "https://play.streamaud.io/lofi-girl", "France"),
    ("Deep House Radio", "https://streaming.radionomy.com/DeepHouseRadio", "France"),
    ("Radio Mirchi US", "https://stream.zeno.fm/fvrx194g44zuv", "India"),
    (
        "Radio City Hindi",
        "https://prisa-radio-city-hindi-aac.cdn.streamfast.biz/prisa-radio-city-hindi-aac",
        "India",
    ),
    ("Record Russian Mix", "https://air.radiorecord.ru/rus_320.mp3", "Russia"),
    ("DFM", "https://dfm.hostingradio.ru/dfm_320.mp3", "Russia"),
    ("NTS Radio", "https://stream-relay-geo.ntslive.net/stream", "UK"),
    ("Radio Paradise: Mellow Mix", "https://stream.radioparadise.com/mellow-320", "USA"),
    ("SomaFM: Groove Salad", "https://ice6.somafm.com/groovesalad-128-mp3", "USA"),
    ("SomaFM: DEF CON Radio", "https://ice6.somafm.com/defcon-128-mp3", "USA"),
    ("SomaFM: Drone Zone", "https://ice6.somafm.com/dronezone-128-mp3", "USA"),
    ("SomaFM: Secret Agent", "https://ice6.somafm.com/secretagent-128-mp3", "USA"),
    ("SomaFM: Lush", "https://ice6.somafm.com/lush-128-mp3", "USA"),
    ("Nightwave Plaza", "https://radio.plaza.one/mp3", "USA"),
    ("Radio Paradise: Main Mix", "https://stream.radioparadise.com/mp3-192", "USA"),
    ("Radio Paradise: Rock Mix", "https://stream.radioparadise.com/rock-320", "USA"),
    ("WNYC 93.9 FM", "https://fm939.wnyc.org/wnycfm", "USA"),
    ("The Current", "https://current.stream.publicradio.org/current.mp3", "USA"),
    ("Classical MPR", "https://cms.stream.publicradio.org/cms.mp3", "USA"),
    ("Jazz24", "https://d.live.npr.org/streams/KNKX_JAZZ24_128.mp3", "USA"),
];

pub fn builtin_stations() -> Vec<RadioStation> {
    BUILTIN_STATIONS
        .iter()
        .map(|(name, url, country)| RadioStation::new(name, url, country))
        .collect()
}

// ── TOML station loader ───────────────────────────────────────────────────────

/// Matches the TOML `[[station]]` table.  Kept apart from `RadioStation` so the
/// file schema can diverge from the wire struct.
#[derive(Debug, serde::Deserialize)]
struct TomlStationFile {
    #[serde(default)]
    station: Vec<TomlStation>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlStation {
    name: String,
    url: String,
    #[serde(default)]
    country: String,
}

pub fn parse_stations_from_toml_str(content: &str) -> anyhow::Result<Vec<RadioStation>> {
    let file: TomlStationFile = toml::from_str(content)?;
    let mut stations: Vec<RadioStation> = Vec::with_capacity(file.station.len());
    for s in file.station {
        let station = RadioStation {
            name: s.name,
            url: s.url,
            country: s.country,
        };
        // identity is the url; a repeated url would make two rows one station
        if stations.contains(&station) {
            warn!("Skipping duplicate station url: {}", station.url);
            continue;
        }
        stations.push(station);
    }
    Ok(stations)
}

pub fn load_stations_from_toml(path: &Path) -> anyhow::Result<Vec<RadioStation>> {
    let content = std::fs::read_to_string(path)?;
    parse_stations_from_toml_str(&content)
}

/// Station list for this run: the user's TOML file when present and valid,
/// else the built-in list.
pub fn load_stations(toml_path: &Path) -> Vec<RadioStation> {
    if toml_path.exists() {
        match load_stations_from_toml(toml_path) {
            Ok(s) if !s.is_empty() => {
                info!("Loaded {} stations from TOML: {}", s.len(), toml_path.display());
                return s;
            }
            Ok(_) => warn!("{} has no stations, using built-in list", toml_path.display()),
            Err(e) => warn!("Failed to parse TOML stations: {}", e),
        }
    }
    let stations = builtin_stations();
    info!("Using {} built-in stations", stations.len());
    stations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_list_is_unique_by_url() {
        let stations = builtin_stations();
        assert_eq!(stations.len(), 20);
        for (i, s) in stations.iter().enumerate() {
            assert!(!stations[i + 1..].contains(s), "duplicate {}", s.url);
        }
    }

    #[test]
    fn test_parse_toml_skips_duplicates() {
        let stations = parse_stations_from_toml_str(
            r#"
            [[station]]
            name = "A"
            url = "https://a.example/stream"
            country = "UK"

            [[station]]
            name = "A again"
            url = "https://a.example/stream"

            [[station]]
            name = "B"
            url = "https://b.example/stream"
            "#,
        )
        .unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].country, "UK");
        assert_eq!(stations[1].country, "");
    }

    #[test]
    fn test_load_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("stations.toml");
        assert_eq!(load_stations(&missing).len(), 20);

        let mut f = std::fs::File::create(&missing).unwrap();
        writeln!(f, "this is = = not toml").unwrap();
        assert_eq!(load_stations(&missing).len(), 20);

        std::fs::write(
            &missing,
            "[[station]]\nname = \"Only\"\nurl = \"https://only.example\"\n",
        )
        .unwrap();
        let loaded = load_stations(&missing);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Only");
    }
}
