//! Render-ready ranking of apartment listings.

use std::collections::HashSet;

use serde::Serialize;

use crate::db::ApartmentListing;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedApartment {
    /// 1-based rank.
    pub position: usize,
    pub email: String,
    pub left_wall_color: String,
    pub right_wall_color: String,
    pub sofa: String,
    pub mirror: String,
    pub votes: u64,
    pub voted_by_me: bool,
    /// False on the viewer's own listing.
    pub can_vote: bool,
}

/// Sort listings by vote count, highest first.
///
/// The sort is stable, so listings with equal counts keep the order they were
/// given in and re-ranking unchanged input never shuffles ties.
pub fn rank<'a, I>(
    listings: I,
    voted_by_me: &HashSet<String>,
    viewer: Option<&str>,
) -> Vec<RankedApartment>
where
    I: IntoIterator<Item = &'a ApartmentListing>,
{
    let mut sorted: Vec<&ApartmentListing> = listings.into_iter().collect();
    sorted.sort_by(|a, b| b.votes.cmp(&a.votes));

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, listing)| RankedApartment {
            position: index + 1,
            email: listing.email.clone(),
            left_wall_color: listing.left_wall_color.clone(),
            right_wall_color: listing.right_wall_color.clone(),
            sofa: listing.sofa.clone(),
            mirror: listing.mirror.clone(),
            votes: listing.votes,
            voted_by_me: voted_by_me.contains(&listing.email),
            can_vote: viewer != Some(listing.email.as_str()),
        })
        .collect()
}

/// One terminal line per row: rank, owner, votes and the vote control.
pub fn render_lines(rows: &[RankedApartment]) -> Vec<String> {
    let width = rows.iter().map(|row| row.email.len()).max().unwrap_or(0);

    rows.iter()
        .map(|row| {
            let control = match (row.can_vote, row.voted_by_me) {
                (false, _) => "-",
                (true, true) => "▼",
                (true, false) => "▲",
            };
            format!(
                "{:>3}. {:<width$}  {:>4}  {}",
                row.position,
                row.email,
                row.votes,
                control,
                width = width
            )
        })
        .collect()
}
