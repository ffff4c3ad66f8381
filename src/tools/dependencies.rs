//! Dependency manifest scanner.
//!
//! Reads a `package.json` or `requirements.txt` manifest and reports pinned
//! packages that fall below the fixed version of a known advisory. The
//! advisory table is built in; nothing is fetched at call time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::error::ToolError;
use crate::core::registry::{ParamType, ParameterSpec, Tool, ToolArguments, ToolDescriptor};

pub const NAME: &str = "scan_dependencies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Ecosystem {
    Npm,
    Pypi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum ManifestFormat {
    #[serde(rename = "package.json")]
    PackageJson,
    #[serde(rename = "requirements.txt")]
    Requirements,
}

impl ManifestFormat {
    fn ecosystem(self) -> Ecosystem {
        match self {
            Self::PackageJson => Ecosystem::Npm,
            Self::Requirements => Ecosystem::Pypi,
        }
    }
}

struct Advisory {
    ecosystem: Ecosystem,
    package: &'static str,
    fixed_in: &'static str,
    id: &'static str,
    severity: &'static str,
    summary: &'static str,
}

const ADVISORIES: &[Advisory] = &[
    Advisory {
        ecosystem: Ecosystem::Npm,
        package: "lodash",
        fixed_in: "4.17.21",
        id: "CVE-2021-23337",
        severity: "high",
        summary: "Command injection via the template function",
    },
    Advisory {
        ecosystem: Ecosystem::Npm,
        package: "minimist",
        fixed_in: "1.2.6",
        id: "CVE-2021-44906",
        severity: "critical",
        summary: "Prototype pollution",
    },
    Advisory {
        ecosystem: Ecosystem::Npm,
        package: "axios",
        fixed_in: "0.21.1",
        id: "CVE-2020-28168",
        severity: "medium",
        summary: "Server-side request forgery through redirects",
    },
    Advisory {
        ecosystem: Ecosystem::Npm,
        package: "node-fetch",
        fixed_in: "2.6.7",
        id: "CVE-2022-0235",
        severity: "high",
        summary: "Cookie and authorization headers forwarded to third-party hosts",
    },
    Advisory {
        ecosystem: Ecosystem::Npm,
        package: "jsonwebtoken",
        fixed_in: "9.0.0",
        id: "CVE-2022-23529",
        severity: "high",
        summary: "Insecure key handling in verify",
    },
    Advisory {
        ecosystem: Ecosystem::Npm,
        package: "express",
        fixed_in: "4.19.2",
        id: "CVE-2024-29041",
        severity: "medium",
        summary: "Open redirect with malformed URLs",
    },
    Advisory {
        ecosystem: Ecosystem::Npm,
        package: "moment",
        fixed_in: "2.29.4",
        id: "CVE-2022-31129",
        severity: "high",
        summary: "Inefficient RFC 2822 date parsing (ReDoS)",
    },
    Advisory {
        ecosystem: Ecosystem::Pypi,
        package: "requests",
        fixed_in: "2.31.0",
        id: "CVE-2023-32681",
        severity: "medium",
        summary: "Proxy-Authorization header leaked on redirect",
    },
    Advisory {
        ecosystem: Ecosystem::Pypi,
        package: "pyyaml",
        fixed_in: "5.4",
        id: "CVE-2020-14343",
        severity: "critical",
        summary: "Arbitrary code execution through full_load",
    },
    Advisory {
        ecosystem: Ecosystem::Pypi,
        package: "urllib3",
        fixed_in: "1.26.5",
        id: "CVE-2021-33503",
        severity: "high",
        summary: "ReDoS in URL authority parsing",
    },
    Advisory {
        ecosystem: Ecosystem::Pypi,
        package: "jinja2",
        fixed_in: "2.11.3",
        id: "CVE-2020-28493",
        severity: "medium",
        summary: "ReDoS in the urlize filter",
    },
];

/// Numeric `major.minor.patch` version. Pre-release and build suffixes are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Version([u64; 3]);

impl Version {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_start_matches('v');
        let numeric: &str = raw
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .next()
            .unwrap_or("");
        if numeric.is_empty() {
            return None;
        }

        let mut parts = [0u64; 3];
        for (slot, piece) in numeric.split('.').filter(|p| !p.is_empty()).enumerate() {
            if slot >= parts.len() {
                break;
            }
            parts[slot] = piece.parse().ok()?;
        }
        Some(Self(parts))
    }

    /// Resolve an npm range to the lowest version it admits. Only exact pins
    /// and `^` / `~` / `=` ranges have a single lower bound worth checking.
    fn from_npm_spec(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.contains("||") || spec.contains(' ') || spec.contains(['x', 'X', '*']) {
            return None;
        }
        let spec = spec.trim_start_matches(['^', '~', '=']);
        if !spec.trim_start_matches('v').starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        Self::parse(spec)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

/// One dependency entry from a manifest.
#[derive(Debug, Clone, PartialEq)]
struct Dependency {
    name: String,
    spec: String,
    version: Option<Version>,
}

#[derive(Debug, Serialize)]
struct Finding {
    package: String,
    version: String,
    fixed_in: &'static str,
    advisory: &'static str,
    severity: &'static str,
    summary: &'static str,
}

#[derive(Debug, Deserialize)]
struct ScanArgs {
    manifest: String,
    #[serde(default = "default_format")]
    format: ManifestFormat,
}

fn default_format() -> ManifestFormat {
    ManifestFormat::PackageJson
}

/// Local dependency vulnerability scanner.
pub struct DependencyScanner {
    descriptor: ToolDescriptor,
}

impl DependencyScanner {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                NAME,
                "Scan a dependency manifest for packages pinned to versions with known vulnerabilities.",
            )
            .with_parameter(
                ParameterSpec::new("manifest", ParamType::String, "Contents of the manifest file")
                    .required(),
            )
            .with_parameter(
                ParameterSpec::new("format", ParamType::String, "Manifest format")
                    .one_of(&["package.json", "requirements.txt"])
                    .with_default("package.json"),
            ),
        }
    }
}

impl Default for DependencyScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for DependencyScanner {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<Value, ToolError> {
        let args: ScanArgs = arguments.deserialize()?;
        let dependencies = match args.format {
            ManifestFormat::PackageJson => parse_package_json(&args.manifest)?,
            ManifestFormat::Requirements => parse_requirements(&args.manifest),
        };
        Ok(scan(args.format.ecosystem(), &dependencies))
    }
}

fn parse_package_json(manifest: &str) -> Result<Vec<Dependency>, ToolError> {
    let value: Value = serde_json::from_str(manifest)
        .map_err(|e| ToolError::InvalidInput(format!("package.json is not valid JSON: {}", e)))?;
    let Value::Object(root) = value else {
        return Err(ToolError::InvalidInput(
            "package.json must contain a JSON object".to_string(),
        ));
    };

    let mut dependencies = Vec::new();
    for section in ["dependencies", "devDependencies", "optionalDependencies"] {
        let Some(entries) = root.get(section) else {
            continue;
        };
        let Value::Object(entries) = entries else {
            return Err(ToolError::InvalidInput(format!("'{}' must be an object", section)));
        };
        for (name, spec) in entries {
            let spec = match spec {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            dependencies.push(Dependency {
                name: name.clone(),
                version: Version::from_npm_spec(&spec),
                spec,
            });
        }
    }
    Ok(dependencies)
}

fn parse_requirements(manifest: &str) -> Vec<Dependency> {
    manifest
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .map(|line| {
            // Drop environment markers
            let line = line.split(';').next().unwrap_or(line).trim();
            let split_at = line
                .find(|c: char| matches!(c, '=' | '<' | '>' | '~' | '!' | ' '))
                .unwrap_or(line.len());
            let (name, spec) = line.split_at(split_at);
            let name = name.split('[').next().unwrap_or(name).trim();
            let spec = spec.trim();
            let version = spec
                .strip_prefix("==")
                .filter(|v| !v.contains(['*', ',']))
                .and_then(Version::parse);
            Dependency {
                name: normalize_pypi_name(name),
                spec: spec.to_string(),
                version,
            }
        })
        .collect()
}

fn normalize_pypi_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

fn scan(ecosystem: Ecosystem, dependencies: &[Dependency]) -> Value {
    let mut vulnerabilities = Vec::new();
    let mut unresolved = Vec::new();

    for dep in dependencies {
        let Some(version) = dep.version else {
            unresolved.push(json!({ "package": dep.name, "spec": dep.spec }));
            continue;
        };
        for advisory in ADVISORIES
            .iter()
            .filter(|a| a.ecosystem == ecosystem && a.package.eq_ignore_ascii_case(&dep.name))
        {
            let Some(fixed) = Version::parse(advisory.fixed_in) else {
                continue;
            };
            if version.cmp(&fixed) == Ordering::Less {
                vulnerabilities.push(Finding {
                    package: dep.name.clone(),
                    version: version.to_string(),
                    fixed_in: advisory.fixed_in,
                    advisory: advisory.id,
                    severity: advisory.severity,
                    summary: advisory.summary,
                });
            }
        }
    }

    let count = |severity: &str| vulnerabilities.iter().filter(|v| v.severity == severity).count();
    let summary = json!({
        "total": vulnerabilities.len(),
        "critical": count("critical"),
        "high": count("high"),
        "medium": count("medium"),
        "low": count("low"),
    });

    json!({
        "ecosystem": ecosystem,
        "scanned": dependencies.len(),
        "vulnerabilities": vulnerabilities,
        "unresolved": unresolved,
        "summary": summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        assert_eq!(Version::parse("4.17.15"), Some(Version([4, 17, 15])));
        assert_eq!(Version::parse("v1.2"), Some(Version([1, 2, 0])));
        assert_eq!(Version::parse("2.0.0-beta.1"), Some(Version([2, 0, 0])));
        assert_eq!(Version::parse("latest"), None);

        assert_eq!(Version::from_npm_spec("^4.17.15"), Some(Version([4, 17, 15])));
        assert_eq!(Version::from_npm_spec("~1.2.5"), Some(Version([1, 2, 5])));
        assert_eq!(Version::from_npm_spec(">=1.0.0"), None);
        assert_eq!(Version::from_npm_spec("1.x"), None);
        assert_eq!(Version::from_npm_spec("*"), None);
        assert_eq!(Version::from_npm_spec("github:user/repo"), None);
        assert!(Version([1, 2, 5]) < Version([1, 2, 6]));
        assert!(Version([0, 21, 1]) > Version([0, 9, 9]));
    }

    #[test]
    fn test_package_json_flags_vulnerable_pin() {
        let manifest = r#"{
            "name": "demo",
            "dependencies": { "lodash": "4.17.15", "react": "^18.2.0" },
            "devDependencies": { "minimist": "^1.2.8", "left-pad": "latest" }
        }"#;
        let deps = parse_package_json(manifest).unwrap();
        let report = scan(Ecosystem::Npm, &deps);

        assert_eq!(report["ecosystem"], "npm");
        assert_eq!(report["scanned"], 4);
        let vulns = report["vulnerabilities"].as_array().unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0]["package"], "lodash");
        assert_eq!(vulns[0]["advisory"], "CVE-2021-23337");
        assert_eq!(report["summary"]["high"], 1);
        assert_eq!(report["unresolved"][0]["package"], "left-pad");
    }

    #[test]
    fn test_requirements_parsing() {
        let manifest = "\
# pinned deps
requests==2.25.0
PyYAML==5.3.1 ; python_version >= '3.6'
urllib3>=1.26.0
jinja2[i18n]==3.1.2
-r other.txt
";
        let deps = parse_requirements(manifest);
        assert_eq!(deps.len(), 4);
        assert_eq!(deps[1].name, "pyyaml");
        assert_eq!(deps[2].version, None);

        let report = scan(Ecosystem::Pypi, &deps);
        let names: Vec<&str> = report["vulnerabilities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["package"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["requests", "pyyaml"]);
        assert_eq!(report["summary"]["critical"], 1);
    }

    #[test]
    fn test_invalid_manifest_is_an_error() {
        assert!(matches!(
            parse_package_json("{ not json"),
            Err(ToolError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_package_json(r#"{"dependencies": ["lodash"]}"#),
            Err(ToolError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_is_deterministic() {
        let tool = DependencyScanner::new();
        let args = tool
            .descriptor()
            .validate(json!({
                "manifest": "requests==2.0.0\n",
                "format": "requirements.txt"
            }))
            .unwrap();
        let first = tool.execute(&args).await.unwrap();
        let second = tool.execute(&args).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["ecosystem"], "pypi");
        assert_eq!(first["vulnerabilities"][0]["package"], "requests");
    }
}
