//! MPEG-DASH manifest generation for a validated delivery credential.
//!
//! Pure data to XML string conversion. No I/O, no validation: callers pass a
//! binding they have already checked.

use crate::license;
use crate::token::DeliveryRecord;
use chrono::{DateTime, Utc};
use std::fmt::Write;

pub const DASH_CONTENT_TYPE: &str = "application/dash+xml";

/// Path segment the segment proxy is mounted under, after the credential
pub const SEGMENT_ROOT: &str = "seg";

const MP4_PROTECTION_SCHEME: &str = "urn:mpeg:dash:mp4protection:2011";
const CLEARKEY_SYSTEM_ID: &str = "urn:uuid:e2719d58-a985-b3c9-781a-b030af78d30e";

const MEDIA_DURATION_SECS: f64 = 734.0;
const SEGMENT_SECS: u64 = 4;
const INIT_FILE: &str = "init.mp4";
const MEDIA_TEMPLATE: &str = "segment-$Number$.m4s";
const START_NUMBER: u32 = 1;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrackKind {
    Video,
    Audio,
    Text,
}

impl TrackKind {
    fn mime_type(self) -> &'static str {
        match self {
            TrackKind::Video => "video/mp4",
            TrackKind::Audio => "audio/mp4",
            TrackKind::Text => "application/mp4",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Text => "text",
        }
    }

    fn timescale(self) -> u64 {
        match self {
            TrackKind::Video => 90_000,
            TrackKind::Audio => 48_000,
            TrackKind::Text => 1_000,
        }
    }

    fn is_protected(self) -> bool {
        !matches!(self, TrackKind::Text)
    }
}

/// One pre-described rendition
#[derive(Debug, Clone, Copy)]
pub struct Representation {
    pub id: &'static str,
    pub kind: TrackKind,
    /// Directory below the segment root, e.g. `video/720p`
    pub path: &'static str,
    pub codecs: &'static str,
    pub bandwidth: u32,
    pub width: u32,
    pub height: u32,
    pub sampling_rate: u32,
}

pub const REPRESENTATIONS: [Representation; 6] = [
    Representation {
        id: "video-1080p",
        kind: TrackKind::Video,
        path: "video/1080p",
        codecs: "avc1.640028",
        bandwidth: 4_800_000,
        width: 1920,
        height: 1080,
        sampling_rate: 0,
    },
    Representation {
        id: "video-720p",
        kind: TrackKind::Video,
        path: "video/720p",
        codecs: "avc1.64001f",
        bandwidth: 2_400_000,
        width: 1280,
        height: 720,
        sampling_rate: 0,
    },
    Representation {
        id: "video-480p",
        kind: TrackKind::Video,
        path: "video/480p",
        codecs: "avc1.64001e",
        bandwidth: 1_200_000,
        width: 854,
        height: 480,
        sampling_rate: 0,
    },
    Representation {
        id: "audio-128k",
        kind: TrackKind::Audio,
        path: "audio/128k",
        codecs: "mp4a.40.2",
        bandwidth: 128_000,
        width: 0,
        height: 0,
        sampling_rate: 48_000,
    },
    Representation {
        id: "audio-64k",
        kind: TrackKind::Audio,
        path: "audio/64k",
        codecs: "mp4a.40.5",
        bandwidth: 64_000,
        width: 0,
        height: 0,
        sampling_rate: 48_000,
    },
    Representation {
        id: "text-en",
        kind: TrackKind::Text,
        path: "subtitles/en",
        codecs: "wvtt",
        bandwidth: 256,
        width: 0,
        height: 0,
        sampling_rate: 0,
    },
];

/// Inputs for one manifest
pub struct ManifestRequest<'a> {
    pub scheme: &'a str,
    pub host: &'a str,
    pub credential: &'a str,
    pub binding: &'a DeliveryRecord,
    /// Only used for the debug comment
    pub generated_at: DateTime<Utc>,
}

/// `<scheme>://<host>/delivery/<credential>/seg/`, credential percent-encoded
pub fn delivery_base(scheme: &str, host: &str, credential: &str) -> String {
    format!(
        "{scheme}://{host}/delivery/{}/{SEGMENT_ROOT}",
        urlencoding::encode(credential)
    )
}

pub fn license_url(scheme: &str, host: &str) -> String {
    format!("{scheme}://{host}/license")
}

/// Generate the MPD document
#[must_use]
pub fn generate(req: &ManifestRequest<'_>) -> String {
    let mut xml = String::with_capacity(8192);
    let base = delivery_base(req.scheme, req.host, req.credential);
    let license_url = license_url(req.scheme, req.host);

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<!-- generated {} | content {} | node {} | token expires {} -->",
        req.generated_at.to_rfc3339(),
        comment_text(&req.binding.content_id),
        comment_text(&req.binding.node_id),
        req.binding.expires_at.to_rfc3339(),
    );
    let _ = writeln!(
        xml,
        "<MPD xmlns=\"urn:mpeg:dash:schema:mpd:2011\" \
         xmlns:cenc=\"urn:mpeg:cenc:2013\" \
         xmlns:dashif=\"https://dashif.org/CPS\" \
         profiles=\"urn:mpeg:dash:profile:isoff-live:2011\" \
         type=\"static\" \
         mediaPresentationDuration=\"{}\" \
         minBufferTime=\"PT2S\">",
        format_duration(MEDIA_DURATION_SECS)
    );
    let _ = writeln!(xml, "  <Period id=\"0\" start=\"PT0S\">");

    for kind in [TrackKind::Video, TrackKind::Audio, TrackKind::Text] {
        write_adaptation_set(&mut xml, kind, &base, &license_url);
    }

    xml.push_str("  </Period>\n");
    xml.push_str("</MPD>\n");

    xml
}

/// `--` may not appear inside an XML comment
fn comment_text(s: &str) -> String {
    let mut text = xml_escape(s);
    while text.contains("--") {
        text = text.replace("--", "- -");
    }
    text
}

fn write_adaptation_set(xml: &mut String, kind: TrackKind, base: &str, license_url: &str) {
    let mut attrs = format!(
        "contentType=\"{}\" mimeType=\"{}\" segmentAlignment=\"true\"",
        kind.content_type(),
        kind.mime_type()
    );
    if kind == TrackKind::Text {
        attrs.push_str(" lang=\"en\"");
    }
    let _ = writeln!(xml, "    <AdaptationSet {attrs}>");

    if kind.is_protected() {
        write_content_protection(xml, license_url);
    }

    for rep in REPRESENTATIONS.iter().filter(|rep| rep.kind == kind) {
        write_representation(xml, rep, base);
    }

    xml.push_str("    </AdaptationSet>\n");
}

fn write_content_protection(xml: &mut String, license_url: &str) {
    let default_kid = license::default_key_id_uuid();
    let _ = writeln!(
        xml,
        "      <ContentProtection schemeIdUri=\"{MP4_PROTECTION_SCHEME}\" value=\"cenc\" \
         cenc:default_KID=\"{default_kid}\"/>"
    );
    let _ = writeln!(
        xml,
        "      <ContentProtection schemeIdUri=\"{CLEARKEY_SYSTEM_ID}\" value=\"ClearKey1.0\">"
    );
    let _ = writeln!(
        xml,
        "        <dashif:Laurl Lic_type=\"EME-1.0\">{}</dashif:Laurl>",
        xml_escape(license_url)
    );
    xml.push_str("      </ContentProtection>\n");
}

fn write_representation(xml: &mut String, rep: &Representation, base: &str) {
    let _ = write!(
        xml,
        "      <Representation id=\"{}\" codecs=\"{}\" bandwidth=\"{}\"",
        rep.id, rep.codecs, rep.bandwidth
    );
    match rep.kind {
        TrackKind::Video => {
            let _ = write!(xml, " width=\"{}\" height=\"{}\"", rep.width, rep.height);
        }
        TrackKind::Audio => {
            let _ = write!(xml, " audioSamplingRate=\"{}\"", rep.sampling_rate);
        }
        TrackKind::Text => {}
    }
    xml.push_str(">\n");

    let _ = writeln!(
        xml,
        "        <BaseURL>{}</BaseURL>",
        xml_escape(&format!("{base}/{}/", rep.path))
    );

    let timescale = rep.kind.timescale();
    let _ = writeln!(
        xml,
        "        <SegmentTemplate initialization=\"{INIT_FILE}\" media=\"{MEDIA_TEMPLATE}\" \
         timescale=\"{timescale}\" duration=\"{}\" startNumber=\"{START_NUMBER}\"/>",
        timescale * SEGMENT_SECS
    );

    xml.push_str("      </Representation>\n");
}

/// Format seconds as ISO 8601 duration (e.g. `PT12M14S`).
fn format_duration(secs: f64) -> String {
    if secs <= 0.0 {
        return "PT0S".to_string();
    }
    let hours = (secs / 3600.0).floor() as u64;
    let mins = ((secs % 3600.0) / 60.0).floor() as u64;
    let remaining = secs % 60.0;

    let mut s = String::from("PT");
    if hours > 0 {
        let _ = write!(s, "{hours}H");
    }
    if mins > 0 {
        let _ = write!(s, "{mins}M");
    }
    if remaining > 0.0 || (hours == 0 && mins == 0) {
        let formatted = format!("{remaining:.1}");
        let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
        let _ = write!(s, "{formatted}S");
    }
    s
}

/// Minimal XML escaping for attribute/text content.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CREDENTIAL: &str = "edge1a2b:Zm9vYmFyYmF6cXV4LWFiY2RlZl9naGlq";

    fn binding() -> DeliveryRecord {
        let created_at = Utc::now();
        DeliveryRecord {
            session: "session".into(),
            node_id: "edge-eu-1".into(),
            content_id: "tears-of-steel".into(),
            created_at,
            expires_at: created_at + Duration::seconds(60),
        }
    }

    fn strip_debug_comment(mpd: &str) -> String {
        mpd.lines()
            .filter(|line| !line.starts_with("<!--"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_every_base_url_embeds_encoded_credential() {
        let binding = binding();
        let mpd = generate(&ManifestRequest {
            scheme: "https",
            host: "media.example.com",
            credential: CREDENTIAL,
            binding: &binding,
            generated_at: Utc::now(),
        });

        let prefix = "https://media.example.com/delivery/edge1a2b%3AZm9vYmFyYmF6cXV4LWFiY2RlZl9naGlq/seg/";
        let base_urls = mpd
            .lines()
            .filter(|line| line.contains("<BaseURL>"))
            .collect::<Vec<_>>();

        assert_eq!(base_urls.len(), REPRESENTATIONS.len());
        for (line, rep) in base_urls.iter().zip(REPRESENTATIONS.iter()) {
            assert!(
                line.contains(&format!("{prefix}{}/</BaseURL>", rep.path)),
                "unexpected base url: {line}"
            );
        }
        // raw credential never leaks unencoded into a URL
        assert!(!mpd.contains(CREDENTIAL));
    }

    #[test]
    fn test_identical_modulo_debug_text() {
        let binding = binding();
        let first = generate(&ManifestRequest {
            scheme: "http",
            host: "localhost:3000",
            credential: CREDENTIAL,
            binding: &binding,
            generated_at: Utc::now(),
        });
        let second = generate(&ManifestRequest {
            scheme: "http",
            host: "localhost:3000",
            credential: CREDENTIAL,
            binding: &binding,
            generated_at: Utc::now() + Duration::seconds(5),
        });

        assert_eq!(strip_debug_comment(&first), strip_debug_comment(&second));
    }

    #[test]
    fn test_protection_points_at_license_endpoint() {
        let binding = binding();
        let mpd = generate(&ManifestRequest {
            scheme: "http",
            host: "localhost:3000",
            credential: CREDENTIAL,
            binding: &binding,
            generated_at: Utc::now(),
        });

        // video and audio sets are protected, text is not
        assert_eq!(mpd.matches(CLEARKEY_SYSTEM_ID).count(), 2);
        assert_eq!(
            mpd.matches("<dashif:Laurl Lic_type=\"EME-1.0\">http://localhost:3000/license</dashif:Laurl>")
                .count(),
            2
        );
        assert!(mpd.contains(&format!(
            "cenc:default_KID=\"{}\"",
            license::default_key_id_uuid()
        )));
    }

    #[test]
    fn test_segment_template_parameters() {
        let binding = binding();
        let mpd = generate(&ManifestRequest {
            scheme: "http",
            host: "localhost",
            credential: CREDENTIAL,
            binding: &binding,
            generated_at: Utc::now(),
        });

        assert!(mpd.contains(
            "<SegmentTemplate initialization=\"init.mp4\" media=\"segment-$Number$.m4s\" \
             timescale=\"90000\" duration=\"360000\" startNumber=\"1\"/>"
        ));
        assert!(mpd.contains("timescale=\"48000\" duration=\"192000\""));
        assert!(mpd.contains("contentType=\"text\""));
        assert!(mpd.contains("width=\"1920\" height=\"1080\""));
        assert!(mpd.contains("mediaPresentationDuration=\"PT12M14S\""));
    }

    #[test]
    fn test_debug_comment_is_escaped() {
        let mut binding = binding();
        binding.content_id = "a<b>&\"c\"".into();
        let mpd = generate(&ManifestRequest {
            scheme: "http",
            host: "localhost",
            credential: CREDENTIAL,
            binding: &binding,
            generated_at: Utc::now(),
        });
        assert!(mpd.contains("content a&lt;b&gt;&amp;&quot;c&quot;"));

        binding.content_id = "x---y".into();
        let mpd = generate(&ManifestRequest {
            scheme: "http",
            host: "localhost",
            credential: CREDENTIAL,
            binding: &binding,
            generated_at: Utc::now(),
        });
        let comment = mpd.lines().find(|line| line.starts_with("<!--")).unwrap();
        let inner = &comment[4..comment.len() - 3];
        assert!(!inner.contains("--"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "PT0S");
        assert_eq!(format_duration(30.0), "PT30S");
        assert_eq!(format_duration(90.5), "PT1M30.5S");
        assert_eq!(format_duration(3661.0), "PT1H1M1S");
    }
}
