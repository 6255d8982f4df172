//! Bounded-cardinality labels for metrics and analytics.
//!
//! A label is derived from the status class alone, plus the admin operation
//! for `/api/` routes. Operations come from a closed set so no raw path or id
//! can end up in a label.

/// Prefix shared by every administrative route.
pub const ADMIN_PREFIX: &str = "/api/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Redirect,
    NotFound,
    Success,
    Unauthorized,
    Forbidden,
    MethodNotAllowed,
    ClientError,
    ServerError,
    Misc,
}

impl Category {
    pub fn from_status(status: u16) -> Self {
        match status {
            300..=399 => Self::Redirect,
            404 => Self::NotFound,
            200..=299 => Self::Success,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            405 => Self::MethodNotAllowed,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Misc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::NotFound => "not_found",
            Self::Success => "success",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::ClientError => "client_error",
            Self::ServerError => "server_error",
            Self::Misc => "misc",
        }
    }

    /// Outcome of a short-path lookup.
    pub fn is_resolution(self) -> bool {
        matches!(self, Self::Redirect | Self::NotFound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminOperation {
    Create,
    Generate,
    Info,
    Fix,
    Update,
    Disable,
    List,
    SearchPath,
    DestinationExists,
    Stats,
    Unknown,
}

impl AdminOperation {
    /// Reads the action segment of `/api/<group>/<action>/...`.
    pub fn from_path(path: &str) -> Self {
        let action = path
            .strip_prefix(ADMIN_PREFIX)
            .and_then(|rest| rest.split('/').nth(1))
            .unwrap_or_default();
        match action {
            "create" => Self::Create,
            "generate" => Self::Generate,
            "info" => Self::Info,
            "fix" => Self::Fix,
            "update" => Self::Update,
            "disable" => Self::Disable,
            "list" => Self::List,
            "searchPath" => Self::SearchPath,
            "destinationExists" => Self::DestinationExists,
            "stats" => Self::Stats,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Generate => "generate",
            Self::Info => "info",
            Self::Fix => "fix",
            Self::Update => "update",
            Self::Disable => "disable",
            Self::List => "list",
            Self::SearchPath => "search_path",
            Self::DestinationExists => "destination_exists",
            Self::Stats => "stats",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub label: String,
    pub category: Category,
    pub operation: Option<AdminOperation>,
    pub is_privileged: bool,
}

pub fn is_privileged(path: &str) -> bool {
    path.starts_with(ADMIN_PREFIX)
}

pub fn classify(path: &str, status: u16) -> Classification {
    let category = Category::from_status(status);
    if is_privileged(path) {
        let operation = AdminOperation::from_path(path);
        Classification {
            label: format!("api_{}_{}", operation.as_str(), category.as_str()),
            category,
            operation: Some(operation),
            is_privileged: true,
        }
    } else {
        Classification {
            label: category.as_str().to_string(),
            category,
            operation: None,
            is_privileged: false,
        }
    }
}
