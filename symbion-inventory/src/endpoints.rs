//! Region endpoints targeted by a query cycle.

/// Endpoint value meaning "every known region".
pub const ALL_REGIONS: &str = "ALL_REGIONS";

/// Public regional endpoints queried for [`ALL_REGIONS`].
pub const KNOWN_ENDPOINTS: &[&str] = &[
    "https://ec2.us-east-2.amazonaws.com",
    "https://ec2.us-east-1.amazonaws.com",
    "https://ec2.us-west-1.amazonaws.com",
    "https://ec2.us-west-2.amazonaws.com",
    "https://ec2.af-south-1.amazonaws.com",
    "https://ec2.ap-east-1.amazonaws.com",
    "https://ec2.ap-southeast-3.amazonaws.com",
    "https://ec2.ap-south-1.amazonaws.com",
    "https://ec2.ap-northeast-3.amazonaws.com",
    "https://ec2.ap-northeast-2.amazonaws.com",
    "https://ec2.ap-southeast-1.amazonaws.com",
    "https://ec2.ap-southeast-2.amazonaws.com",
    "https://ec2.ap-northeast-1.amazonaws.com",
    "https://ec2.ca-central-1.amazonaws.com",
    "https://ec2.eu-central-1.amazonaws.com",
    "https://ec2.eu-west-1.amazonaws.com",
    "https://ec2.eu-west-2.amazonaws.com",
    "https://ec2.eu-south-1.amazonaws.com",
    "https://ec2.eu-west-3.amazonaws.com",
    "https://ec2.eu-north-1.amazonaws.com",
    "https://ec2.me-south-1.amazonaws.com",
    "https://ec2.sa-east-1.amazonaws.com",
];

/// Label used for the client's default endpoint.
pub const DEFAULT_LABEL: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionTargets {
    /// No endpoint configured: one query against the client's default region.
    Default,
    Endpoints(Vec<String>),
}

impl RegionTargets {
    pub fn parse(endpoint: Option<&str>) -> Self {
        let Some(endpoint) = endpoint.map(str::trim).filter(|e| !e.is_empty()) else {
            return RegionTargets::Default;
        };
        if endpoint.eq_ignore_ascii_case(ALL_REGIONS) {
            return RegionTargets::Endpoints(KNOWN_ENDPOINTS.iter().map(|e| e.to_string()).collect());
        }
        let list: Vec<String> = endpoint
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if list.is_empty() {
            RegionTargets::Default
        } else {
            RegionTargets::Endpoints(list)
        }
    }

    /// Endpoints in query order; `None` stands for the default endpoint.
    pub fn endpoints(&self) -> Vec<Option<&str>> {
        match self {
            RegionTargets::Default => vec![None],
            RegionTargets::Endpoints(list) => list.iter().map(|e| Some(e.as_str())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RegionTargets::Default => 1,
            RegionTargets::Endpoints(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Short name of an endpoint: its host, without scheme, port or path.
pub fn endpoint_label(endpoint: Option<&str>) -> String {
    let Some(endpoint) = endpoint else {
        return DEFAULT_LABEL.to_string();
    };
    let without_scheme = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    let host = without_scheme.split(['/', ':']).next().unwrap_or(without_scheme);
    if host.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        host.to_string()
    }
}
