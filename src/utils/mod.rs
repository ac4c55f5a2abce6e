pub mod paths;
pub mod redact;
pub mod url_validation;
