use std::borrow::Cow;

/// Provider identifier - mostly static constants ("sleeper", "espn", ...)
pub type ProviderId = Cow<'static, str>;

/// Provider-scoped league identifier, discovered at runtime
pub type LeagueId = String;
