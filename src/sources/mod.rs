//! Concrete data sources: the APIs and pages records are collected from, with the
//! column schema each one writes.

use clap::ValueEnum;

use crate::request::HttpClient;
use crate::strategy::FetchRecord;

mod steam;
mod steamcharts;
pub(crate) mod steamspy;
mod steamspy_html;

pub use steam::SteamStore;
pub use steamcharts::SteamCharts;
pub use steamspy::SteamSpy;
pub(crate) use steamspy::STEAMSPY_API_URL;
pub use steamspy_html::SteamSpyHtml;

pub const STEAM_COLUMNS: &[&str] = &[
    "type",
    "name",
    "steam_appid",
    "required_age",
    "is_free",
    "controller_support",
    "dlc",
    "detailed_description",
    "about_the_game",
    "short_description",
    "fullgame",
    "supported_languages",
    "header_image",
    "website",
    "pc_requirements",
    "mac_requirements",
    "linux_requirements",
    "legal_notice",
    "drm_notice",
    "ext_user_account_notice",
    "developers",
    "publishers",
    "demos",
    "price_overview",
    "packages",
    "package_groups",
    "platforms",
    "metacritic",
    "reviews",
    "categories",
    "genres",
    "screenshots",
    "movies",
    "recommendations",
    "achievements",
    "release_date",
    "support_info",
    "background",
    "content_descriptors",
];

pub const STEAMSPY_COLUMNS: &[&str] = &[
    "appid",
    "name",
    "developer",
    "publisher",
    "score_rank",
    "positive",
    "negative",
    "userscore",
    "owners",
    "average_forever",
    "average_2weeks",
    "median_forever",
    "median_2weeks",
    "price",
    "initialprice",
    "discount",
    "languages",
    "genre",
    "ccu",
    "tags",
];

pub const STEAMSPY_HTML_COLUMNS: &[&str] = &["appid", "name", "followers", "old_userscore"];

pub const STEAMCHARTS_COLUMNS: &[&str] = &[
    "appid",
    "name",
    "24-hour peak",
    "all-time peak",
    "all-time peak date",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// Steam Store `appdetails` API
    Steam,
    /// SteamSpy `appdetails` API
    Steamspy,
    /// SteamSpy app page (followers, old userscore)
    SteamspyHtml,
    /// SteamCharts app page (player peaks)
    Steamcharts,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Steam,
        Source::Steamspy,
        Source::SteamspyHtml,
        Source::Steamcharts,
    ];

    /// Key of this source in the config's `sources` table.
    pub fn name(self) -> &'static str {
        match self {
            Source::Steam => "steam",
            Source::Steamspy => "steamspy",
            Source::SteamspyHtml => "steamspy-html",
            Source::Steamcharts => "steamcharts",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Source::Steam => STEAM_COLUMNS,
            Source::Steamspy => STEAMSPY_COLUMNS,
            Source::SteamspyHtml => STEAMSPY_HTML_COLUMNS,
            Source::Steamcharts => STEAMCHARTS_COLUMNS,
        }
    }

    pub fn strategy(self, client: HttpClient) -> Box<dyn FetchRecord> {
        match self {
            Source::Steam => Box::new(SteamStore::new(client)),
            Source::Steamspy => Box::new(SteamSpy::new(client)),
            Source::SteamspyHtml => Box::new(SteamSpyHtml::new(client)),
            Source::Steamcharts => Box::new(SteamCharts::new(client)),
        }
    }
}
