use std::env;
use std::fmt;

/// Isolation class of a region.
///
/// Regions of the same non-internal kind can reach each other's endpoints;
/// internal regions are only reachable from themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Global,
    Financial,
    Internal,
}

/// A Tencent Cloud region identifier plus its isolation kind.
///
/// Well-known public regions are available as constructors
/// (e.g. [`Region::ap_guangzhou`]). Arbitrary region ids can be created with
/// [`Region::new`], which infers the kind from the id suffix: ids ending in
/// `-fsi` are financial, everything else is treated as internal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    id: String,
    kind: RegionKind,
}

macro_rules! well_known_regions {
    ($(($fn_name:ident, $id:literal, $kind:ident)),* $(,)?) => {
        $(
            pub fn $fn_name() -> Self {
                Self::with_kind($id, RegionKind::$kind)
            }
        )*
    };
}

impl Region {
    /// Creates a region with the kind inferred from the id suffix.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let kind = if id.ends_with("-fsi") {
            RegionKind::Financial
        } else {
            RegionKind::Internal
        };
        Self { id, kind }
    }

    /// Creates a region with an explicit kind.
    pub fn with_kind(id: impl Into<String>, kind: RegionKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Reads the fallback default region from `TENCENTCLOUD_REGION`.
    pub fn default_from_env() -> Option<Self> {
        match env::var("TENCENTCLOUD_REGION") {
            Ok(id) if !id.is_empty() => Some(Self::new(id)),
            _ => None,
        }
    }

    /// Returns the region id as `&str`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Two regions are mutually reachable iff they are equal, or they share
    /// a kind other than [`RegionKind::Internal`].
    pub fn is_reachable_from(&self, other: &Region) -> bool {
        self == other || (self.kind == other.kind && self.kind != RegionKind::Internal)
    }

    well_known_regions! {
        (ap_bangkok, "ap-bangkok", Global),
        (ap_beijing, "ap-beijing", Global),
        (ap_chengdu, "ap-chengdu", Global),
        (ap_chongqing, "ap-chongqing", Global),
        (ap_guangzhou, "ap-guangzhou", Global),
        (ap_hongkong, "ap-hongkong", Global),
        (ap_jakarta, "ap-jakarta", Global),
        (ap_mumbai, "ap-mumbai", Global),
        (ap_nanjing, "ap-nanjing", Global),
        (ap_seoul, "ap-seoul", Global),
        (ap_shanghai, "ap-shanghai", Global),
        (ap_shanghai_fsi, "ap-shanghai-fsi", Financial),
        (ap_shenzhen_fsi, "ap-shenzhen-fsi", Financial),
        (ap_singapore, "ap-singapore", Global),
        (ap_tokyo, "ap-tokyo", Global),
        (eu_frankfurt, "eu-frankfurt", Global),
        (na_ashburn, "na-ashburn", Global),
        (na_siliconvalley, "na-siliconvalley", Global),
        (sa_saopaulo, "sa-saopaulo", Global),
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
