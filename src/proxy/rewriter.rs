//! Keeps the embedded OHIF viewer same-origin and tenant-scoped.
//!
//! This is a string transform over the viewer's HTML/JS output, not a parser.
//! The substitution table is tied to the OHIF bundle layout served by the
//! Orthanc OHIF plugin and has to be revisited when that build output changes.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Bump when the substitution table changes.
pub const REWRITE_RULES_VERSION: u32 = 2;

static ABSOLUTE_OHIF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^/"'`\s]+/ohif\b"#).expect("valid regex"));

static ABSOLUTE_DICOMWEB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^"'`\s]*?/dicom-web\b"#).expect("valid regex"));

static QUOTED_OHIF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(["'`])/ohif/"#).expect("valid regex"));

static QUOTED_DICOMWEB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(["'`])/dicom-web\b"#).expect("valid regex"));

static ROOT_KEYS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(wadoRoot|qidoRoot|wadoUriRoot)(["']?\s*:\s*)(["'`])([^"'`]*)(["'`])"#)
        .expect("valid regex")
});

static ORIGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^https?://[^/]+"#).expect("valid regex"));

/// Whether `text` contains anything the rewriter would touch.
pub fn needs_rewrite(text: &str) -> bool {
    text.contains("/ohif")
        || text.contains("dicom-web")
        || text.contains("wadoRoot")
        || text.contains("qidoRoot")
        || text.contains("wadoUriRoot")
}

/// Rewrite upstream viewer content so that every URL it uses points back at
/// the gateway mounted under `mount_path`, carrying `clinic_id` on the
/// DICOMweb roots when one is given.
pub fn rewrite_viewer_content(text: &str, mount_path: &str, clinic_id: Option<&str>) -> String {
    let ohif = format!("{}/ohif", mount_path);
    let dicomweb = format!("{}/dicom-web", mount_path);

    let text = ABSOLUTE_OHIF.replace_all(text, |_: &Captures| ohif.clone());
    let text = ABSOLUTE_DICOMWEB.replace_all(&text, |_: &Captures| dicomweb.clone());
    let text = QUOTED_OHIF.replace_all(&text, |caps: &Captures| format!("{}{}/", &caps[1], ohif));
    let text =
        QUOTED_DICOMWEB.replace_all(&text, |caps: &Captures| format!("{}{}", &caps[1], dicomweb));
    let text = ROOT_KEYS.replace_all(&text, |caps: &Captures| {
        format!(
            "{}{}{}{}{}",
            &caps[1],
            &caps[2],
            &caps[3],
            scoped_root(&caps[4], mount_path, clinic_id),
            &caps[5]
        )
    });
    text.into_owned()
}

/// Normalize a viewer root value to a gateway route and attach the tenant.
/// DICOMweb roots go to the DICOMweb proxy; anything else (WADO-URI) is served
/// by Orthanc's REST surface.
fn scoped_root(value: &str, mount_path: &str, clinic_id: Option<&str>) -> String {
    let dicomweb = format!("{}/dicom-web", mount_path);
    let orthanc = format!("{}/orthanc", mount_path);

    let mut path = ORIGIN.replace(value, "").into_owned();
    while let Some(rest) = path.strip_prefix("../").or_else(|| path.strip_prefix("./")) {
        path = rest.to_string();
    }

    let (path_only, query) = match path.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (path.clone(), None),
    };

    let mut root = if path_only.contains("dicom-web") {
        if path_only.starts_with(&dicomweb) {
            path_only
        } else {
            dicomweb
        }
    } else if path_only == orthanc || path_only.starts_with(&format!("{}/", orthanc)) {
        path_only
    } else {
        format!("{}/{}", orthanc, path_only.trim_start_matches('/'))
    };

    let mut params: Vec<String> = query
        .map(|q| {
            q.split('&')
                .filter(|p| !p.is_empty() && !p.starts_with("clinicId="))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if let Some(id) = clinic_id.filter(|id| !id.is_empty()) {
        params.push(format!("clinicId={}", urlencoding::encode(id)));
    }
    if !params.is_empty() {
        root.push('?');
        root.push_str(&params.join("&"));
    }
    root
}
