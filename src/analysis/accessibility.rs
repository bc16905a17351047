const PAYWALL_INDICATORS: &[&str] = &[
    "paywall",
    "subscription required",
    "unable to access",
    "authorization",
    "sign in to read",
    "premium content",
    "subscribers only",
    "login to continue",
    "access denied",
    "content not available",
];

/// Whether readers can see the article body without a subscription or login.
pub fn is_accessible(content: Option<&str>) -> bool {
    let Some(content) = content.map(str::trim).filter(|c| !c.is_empty()) else {
        return false;
    };

    let lower = content.to_lowercase();
    !PAYWALL_INDICATORS.iter().any(|marker| lower.contains(marker))
}
