use crate::error::WagerError;
use crate::models::{GameKey, Team};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Normalize a team identifier for lookup: trim, case-fold, collapse
/// whitespace, and strip the punctuation providers disagree on.
pub fn normalize_identifier(raw: &str) -> String {
    let mut s = raw.to_uppercase();
    s = s.replace('&', "AND");
    s = s.replace('.', "");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Immutable team index built once at load time. Three lookup tiers are
/// kept separate so the match order is canonical name, then external
/// provider id, then alias.
pub struct TeamRegistry {
    teams: Vec<Team>,
    canonical: HashMap<String, Vec<usize>>,
    external: HashMap<String, Vec<usize>>,
    alias: HashMap<String, Vec<usize>>,
}

impl TeamRegistry {
    pub fn from_teams(teams: Vec<Team>) -> Result<Self, WagerError> {
        let mut canonical: HashMap<String, Vec<usize>> = HashMap::new();
        let mut external: HashMap<String, Vec<usize>> = HashMap::new();
        let mut alias: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, team) in teams.iter().enumerate() {
            let key = normalize_identifier(&team.canonical_name);
            let entry = canonical.entry(key).or_default();
            if entry.iter().any(|&i| teams[i].league == team.league) {
                return Err(WagerError::Validation(format!(
                    "duplicate canonical name {:?} in league {}",
                    team.canonical_name, team.league
                )));
            }
            entry.push(idx);

            for id in team.external_ids.values() {
                external.entry(normalize_identifier(id)).or_default().push(idx);
            }

            for a in &team.aliases {
                let entry = alias.entry(normalize_identifier(a)).or_default();
                if entry.iter().any(|&i| teams[i].league == team.league) {
                    return Err(WagerError::Validation(format!(
                        "alias {:?} maps to two teams in league {}",
                        a, team.league
                    )));
                }
                entry.push(idx);
            }
        }

        Ok(Self { teams, canonical, external, alias })
    }

    /// Load the immutable team seed file (JSON array of teams).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read team seed file: {}", path.display()))?;
        let teams: Vec<Team> =
            serde_json::from_str(&content).context("failed to parse team seed JSON")?;
        Self::from_teams(teams).map_err(|e| anyhow::anyhow!("invalid team seed: {}", e))
    }

    /// Resolve any identifier (canonical name, provider id, mascot,
    /// abbreviation...) to its Team. League-scoped when the caller knows
    /// the league; otherwise the first match across all leagues wins.
    pub fn resolve(&self, identifier: &str, league: Option<&str>) -> Result<&Team, WagerError> {
        let key = normalize_identifier(identifier);
        for tier in [&self.canonical, &self.external, &self.alias] {
            if let Some(indices) = tier.get(&key) {
                let hit = indices.iter().find(|&&i| match league {
                    Some(l) => self.teams[i].league.eq_ignore_ascii_case(l),
                    None => true,
                });
                if let Some(&i) = hit {
                    return Ok(&self.teams[i]);
                }
            }
        }
        Err(WagerError::TeamNotFound {
            identifier: identifier.to_string(),
            league: league.map(str::to_string),
        })
    }

    pub fn team_by_id(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// Stable correlation key for a contest: `awayId|homeId`.
pub fn game_key(away: &Team, home: &Team) -> GameKey {
    GameKey(format!("{}|{}", away.id, home.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn team(id: &str, name: &str, league: &str, aliases: &[&str], ext: &[(&str, &str)]) -> Team {
        Team {
            id: id.to_string(),
            canonical_name: name.to_string(),
            league: league.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            external_ids: ext
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn registry() -> TeamRegistry {
        TeamRegistry::from_teams(vec![
            team(
                "nfl-lar",
                "Los Angeles Rams",
                "nfl",
                &["Rams", "LA Rams", "LAR", "St. Louis Rams"],
                &[("jsonodds", "LosAngelesRams"), ("the-odds-api", "Los Angeles Rams")],
            ),
            team(
                "nfl-ari",
                "Arizona Cardinals",
                "nfl",
                &["Cardinals", "ARI", "Arizona"],
                &[("jsonodds", "ArizonaCardinals")],
            ),
            team(
                "mlb-stl",
                "St. Louis Cardinals",
                "mlb",
                &["Cardinals", "STL"],
                &[],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_by_canonical_alias_and_external_id() {
        let reg = registry();
        let by_name = reg.resolve("Los Angeles Rams", Some("nfl")).unwrap();
        let by_alias = reg.resolve("Rams", Some("nfl")).unwrap();
        let by_ext = reg.resolve("LosAngelesRams", Some("nfl")).unwrap();
        assert_eq!(by_name.id, "nfl-lar");
        assert_eq!(by_alias.id, by_name.id);
        assert_eq!(by_ext.id, by_name.id);
    }

    #[test]
    fn test_resolve_is_case_and_punctuation_insensitive() {
        let reg = registry();
        assert_eq!(reg.resolve("st louis rams", Some("nfl")).unwrap().id, "nfl-lar");
        assert_eq!(reg.resolve("  LA RAMS  ", Some("nfl")).unwrap().id, "nfl-lar");
    }

    #[test]
    fn test_league_scoping_disambiguates_shared_alias() {
        let reg = registry();
        assert_eq!(reg.resolve("Cardinals", Some("nfl")).unwrap().id, "nfl-ari");
        assert_eq!(reg.resolve("Cardinals", Some("mlb")).unwrap().id, "mlb-stl");
        // Without a league the first loaded match wins
        assert_eq!(reg.resolve("Cardinals", None).unwrap().id, "nfl-ari");
    }

    #[test]
    fn test_resolve_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.resolve("Rams", Some("mlb")),
            Err(WagerError::TeamNotFound { .. })
        ));
        assert!(reg.resolve("Gotham Knights", None).is_err());
    }

    #[test]
    fn test_canonical_name_beats_alias() {
        // "St. Louis Cardinals" is a canonical MLB name; league-less lookup
        // must hit the canonical tier before any alias tier entry.
        let reg = registry();
        assert_eq!(reg.resolve("St. Louis Cardinals", None).unwrap().id, "mlb-stl");
    }

    #[test]
    fn test_duplicate_alias_in_league_rejected() {
        let result = TeamRegistry::from_teams(vec![
            team("nfl-a", "Team A", "nfl", &["Birds"], &[]),
            team("nfl-b", "Team B", "nfl", &["Birds"], &[]),
        ]);
        assert!(matches!(result, Err(WagerError::Validation(_))));
    }

    #[test]
    fn test_game_key_is_away_then_home() {
        let reg = registry();
        let away = reg.resolve("Rams", Some("nfl")).unwrap();
        let home = reg.resolve("ARI", Some("nfl")).unwrap();
        assert_eq!(game_key(away, home).0, "nfl-lar|nfl-ari");
    }
}
