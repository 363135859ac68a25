//! Sites at which hazard is computed.
use crate::geo::Point;
use crate::id::{define_id_getter, define_id_type};

define_id_type! {SiteID}

/// An observation site
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Unique identifier for the site
    pub id: SiteID,
    /// Location of the site
    pub location: Point,
}
define_id_getter! {Site, SiteID}

/// An ordered collection of sites.
///
/// Curves are indexed by a site's position in the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteCollection(Vec<Site>);

impl SiteCollection {
    /// Create a new [`SiteCollection`]
    pub fn new(sites: Vec<Site>) -> Self {
        Self(sites)
    }

    /// The number of sites
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no sites
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the sites
    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.0.iter()
    }

    /// The sites as a slice
    pub fn as_slice(&self) -> &[Site] {
        &self.0
    }
}

impl FromIterator<Site> for SiteCollection {
    fn from_iter<I: IntoIterator<Item = Site>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
