// Route templates for dynamically bound endpoints

use std::collections::HashMap;

use percent_encoding::percent_decode_str;

/// One segment of a route template.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
	Literal(String),
	Param(String),
}

/// A compiled `METHOD /path/{param}` pair from a document's endpoint
/// block. Matching is segment-wise against the percent-decoded request
/// path; leading and trailing slashes are ignored.
#[derive(Debug, Clone)]
pub struct RouteBinding {
	method: String,
	segments: Vec<PathSegment>,
}

impl RouteBinding {
	pub fn new(method: &str, path: &str) -> Self {
		let segments = path
			.split('/')
			.filter(|s| !s.is_empty())
			.map(|s| {
				if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
					PathSegment::Param(name.to_string())
				} else {
					PathSegment::Literal(s.to_string())
				}
			})
			.collect();
		Self {
			method: method.to_uppercase(),
			segments,
		}
	}

	pub fn method(&self) -> &str {
		&self.method
	}

	/// Try to match a request path, returning captured path parameters.
	pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
		let decoded = percent_decode_str(path).decode_utf8_lossy();
		let parts: Vec<&str> = decoded.split('/').filter(|s| !s.is_empty()).collect();
		if parts.len() != self.segments.len() {
			return None;
		}

		let mut params = HashMap::new();
		for (segment, part) in self.segments.iter().zip(parts) {
			match segment {
				PathSegment::Literal(expected) if expected == part => {},
				PathSegment::Literal(_) => return None,
				PathSegment::Param(name) => {
					params.insert(name.clone(), part.to_string());
				},
			}
		}
		Some(params)
	}
}
