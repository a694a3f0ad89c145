//! Built-in provider adapters.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;

use super::adapter::{AuthScheme, EndpointSpec, ParamPlacement, ProviderAdapter};
use crate::models::{DataType, HttpMethod};

pub const SLEEPER: &str = "sleeper";
pub const ESPN: &str = "espn";
pub const FLEAFLICKER: &str = "fleaflicker";

const JSON_HEADERS: &[(&str, &str)] = &[("Accept", "application/json")];

const fn get(
    data_type: DataType,
    path: &'static str,
    fixed_query: &'static [(&'static str, &'static str)],
    records_at: Option<&'static str>,
) -> EndpointSpec {
    EndpointSpec {
        data_type,
        method: HttpMethod::Get,
        path,
        league_param: None,
        fixed_query,
        placement: ParamPlacement::Query,
        records_at,
    }
}

// Sleeper: public, league and round/week live in the path.
static SLEEPER_ENDPOINTS: &[EndpointSpec] = &[
    get(DataType::Standings, "/league/{league_id}/rosters", &[], None),
    get(DataType::Matchups, "/league/{league_id}/matchups/{week}", &[], None),
    get(
        DataType::Transactions,
        "/league/{league_id}/transactions/{round}",
        &[],
        None,
    ),
    // The league lists its drafts newest first.
    get(DataType::Drafts, "/league/{league_id}/drafts", &[], Some("/0")),
];

// ESPN: one league document, shaped by `view`. Private leagues need cookies.
const ESPN_LEAGUE: &str = "/seasons/{season}/segments/0/leagues/{league_id}";

static ESPN_ENDPOINTS: &[EndpointSpec] = &[
    get(
        DataType::Standings,
        ESPN_LEAGUE,
        &[("view", "mStandings")],
        Some("/teams"),
    ),
    get(
        DataType::Matchups,
        ESPN_LEAGUE,
        &[("view", "mMatchupScore")],
        Some("/schedule"),
    ),
    get(
        DataType::Transactions,
        ESPN_LEAGUE,
        &[("view", "mTransactions2")],
        Some("/transactions"),
    ),
    get(DataType::Drafts, ESPN_LEAGUE, &[("view", "mDraftDetail")], None),
    get(DataType::Analytics, ESPN_LEAGUE, &[("view", "mTeam")], None),
];

// Fleaflicker: RPC-style endpoints, league id as a query parameter.
static FLEAFLICKER_ENDPOINTS: &[EndpointSpec] = &[
    EndpointSpec {
        league_param: Some("league_id"),
        ..get(
            DataType::Standings,
            "/FetchLeagueStandings",
            &[("sport", "NFL")],
            Some("/divisions/0/teams"),
        )
    },
    EndpointSpec {
        league_param: Some("league_id"),
        ..get(
            DataType::Matchups,
            "/FetchLeagueScoreboard",
            &[("sport", "NFL")],
            Some("/games"),
        )
    },
];

fn builtin() -> Vec<ProviderAdapter> {
    vec![
        ProviderAdapter {
            id: SLEEPER,
            auth: AuthScheme::None,
            default_headers: JSON_HEADERS,
            endpoints: SLEEPER_ENDPOINTS,
        },
        ProviderAdapter {
            id: ESPN,
            auth: AuthScheme::Cookies {
                names: &[("espn_s2", "espn_s2"), ("SWID", "swid")],
            },
            default_headers: JSON_HEADERS,
            endpoints: ESPN_ENDPOINTS,
        },
        ProviderAdapter {
            id: FLEAFLICKER,
            auth: AuthScheme::None,
            default_headers: JSON_HEADERS,
            endpoints: FLEAFLICKER_ENDPOINTS,
        },
    ]
}

lazy_static! {
    pub(crate) static ref BUILTIN_ADAPTERS: HashMap<String, Arc<ProviderAdapter>> = builtin()
        .into_iter()
        .map(|adapter| (adapter.id.to_string(), Arc::new(adapter)))
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contents() {
        assert_eq!(BUILTIN_ADAPTERS.len(), 3);

        let sleeper = &BUILTIN_ADAPTERS[SLEEPER];
        assert_eq!(
            sleeper.supported(),
            vec![
                DataType::Standings,
                DataType::Matchups,
                DataType::Transactions,
                DataType::Drafts
            ]
        );
        assert!(!sleeper.supports(DataType::Analytics));

        let espn = &BUILTIN_ADAPTERS[ESPN];
        assert_eq!(espn.supported().len(), DataType::ALL.len());
        assert_eq!(espn.auth.required_credentials(), vec!["espn_s2", "swid"]);
    }

    #[test]
    fn test_every_endpoint_is_a_read() {
        for adapter in BUILTIN_ADAPTERS.values() {
            for endpoint in adapter.endpoints {
                assert_eq!(endpoint.method, HttpMethod::Get, "{}", adapter.id);
                assert!(endpoint.path.starts_with('/'));
            }
        }
    }
}
