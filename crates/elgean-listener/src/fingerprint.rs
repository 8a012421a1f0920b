//! Device fingerprint for anonymous listeners.
//!
//! A fixed, ordered set of environment readings is serialised to JSON and
//! run through a 32-bit rolling hash. The result is a short hex string that
//! is stable for an unchanged device and *usually* differs between devices.
//! It is not a credential: near-identical machines can and do collide.
//!
//! Collection never fails. Each reading that cannot be taken is replaced by
//! a fixed sentinel so the serialised form (and therefore the hash) stays
//! deterministic.

use serde::{Serialize, Serializer};

// ── Sentinels ─────────────────────────────────────────────────────────────────

pub const UNKNOWN: &str = "unknown";
pub const CANVAS_UNAVAILABLE: &str = "canvas-unavailable";
pub const GPU_UNAVAILABLE: &str = "gpu-unavailable";
pub const GPU_SUPPORTED: &str = "gpu-supported";

/// Longest render-surface probe kept in the attribute set.
const CANVAS_PROBE_CHARS: usize = 50;
/// Longest GPU renderer string kept in the attribute set.
const GPU_PROBE_CHARS: usize = 30;

// ── Hash ──────────────────────────────────────────────────────────────────────

/// `h = h * 31 + unit` over UTF-16 code units, wrapping at 32 bits, then
/// the absolute value in lowercase hex.
pub fn rolling_hash(input: &str) -> String {
    let hash = input
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    format!("{:x}", i64::from(hash).unsigned_abs())
}

// ── Probe ─────────────────────────────────────────────────────────────────────

/// Result of the GPU renderer probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuProbe {
    /// No GPU interface could be found.
    Unavailable,
    /// A GPU is present but its renderer string is hidden.
    Supported,
    Renderer(String),
}

/// Source of the raw device readings. `None` means "could not read".
pub trait DeviceProbe {
    fn user_agent(&self) -> Option<String>;
    fn language(&self) -> Option<String>;
    fn platform(&self) -> Option<String>;
    /// Width and height of the display surface.
    fn screen(&self) -> Option<(u32, u32)>;
    fn color_depth(&self) -> Option<u32>;
    fn timezone(&self) -> Option<String>;
    fn logical_cores(&self) -> Option<usize>;
    /// Installed memory in GiB, bucketed (see [`memory_class_from_kib`]).
    fn memory_class(&self) -> Option<f64>;
    /// Output of a rendering probe of the display surface.
    fn canvas(&self) -> Option<String>;
    fn gpu(&self) -> GpuProbe;
}

// ── Attribute set ─────────────────────────────────────────────────────────────

/// A reading that is either numeric or the `"unknown"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Count(u64),
    Fraction(f64),
    Unknown,
}

impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Signal::Count(n) => serializer.serialize_u64(n),
            Signal::Fraction(f) if f.is_finite() && f.fract() == 0.0 && f >= 0.0 => {
                serializer.serialize_u64(f as u64)
            }
            Signal::Fraction(f) if f.is_finite() => serializer.serialize_f64(f),
            _ => serializer.serialize_str(UNKNOWN),
        }
    }
}

/// Fingerprint inputs in hashing order. Field order is the serialisation
/// order; do not reorder without accepting that every listener id changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAttributes {
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub screen_resolution: String,
    pub screen_color_depth: Signal,
    pub timezone: String,
    pub hardware_concurrency: Signal,
    pub device_memory: Signal,
    pub canvas: String,
    pub gpu: String,
}

impl DeviceAttributes {
    pub fn collect(probe: &impl DeviceProbe) -> Self {
        let text = |v: Option<String>| v.filter(|s| !s.is_empty()).unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            user_agent: text(probe.user_agent()),
            language: text(probe.language()),
            platform: text(probe.platform()),
            screen_resolution: probe
                .screen()
                .map(|(w, h)| format!("{}x{}", w, h))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            screen_color_depth: probe.color_depth().map_or(Signal::Unknown, |d| Signal::Count(d.into())),
            timezone: text(probe.timezone()),
            hardware_concurrency: probe
                .logical_cores()
                .map_or(Signal::Unknown, |n| Signal::Count(n as u64)),
            device_memory: probe.memory_class().map_or(Signal::Unknown, Signal::Fraction),
            canvas: probe
                .canvas()
                .filter(|s| !s.is_empty())
                .map(|s| truncate_chars(&s, CANVAS_PROBE_CHARS))
                .unwrap_or_else(|| CANVAS_UNAVAILABLE.to_string()),
            gpu: match probe.gpu() {
                GpuProbe::Unavailable => GPU_UNAVAILABLE.to_string(),
                GpuProbe::Supported => GPU_SUPPORTED.to_string(),
                GpuProbe::Renderer(r) if r.trim().is_empty() => GPU_SUPPORTED.to_string(),
                GpuProbe::Renderer(r) => truncate_chars(r.trim(), GPU_PROBE_CHARS),
            },
        }
    }

    /// Stable JSON form of the attribute set.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn fingerprint(&self) -> String {
        rolling_hash(&self.canonical())
    }
}

/// Hash of the current device environment as seen through `probe`.
pub fn compute_device_fingerprint(probe: &impl DeviceProbe) -> String {
    DeviceAttributes::collect(probe).fingerprint()
}

// ── Composite identity ────────────────────────────────────────────────────────

/// Network half plus device half of a listener id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerIdentity {
    /// `None` when the client address could not be obtained.
    pub network_hash: Option<String>,
    pub device_hash: String,
}

impl ListenerIdentity {
    /// `{network}-{device}`, or just `{device}` without a network hash.
    pub fn composite_id(&self) -> String {
        match &self.network_hash {
            Some(net) => format!("{}-{}", net, self.device_hash),
            None => self.device_hash.clone(),
        }
    }
}

// ── System probe ──────────────────────────────────────────────────────────────

/// Reads the native process environment.
///
/// Screen geometry is not discoverable from here; the front end passes in
/// whatever surface it renders to via [`SystemProbe::with_screen`].
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    screen: Option<(u32, u32)>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = Some((width, height));
        self
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl DeviceProbe for SystemProbe {
    fn user_agent(&self) -> Option<String> {
        Some(format!(
            "elgean/{} ({}; {})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        ))
    }

    fn language(&self) -> Option<String> {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|k| env_nonempty(k))
            .find_map(|v| language_tag(&v))
    }

    fn platform(&self) -> Option<String> {
        Some(format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH))
    }

    fn screen(&self) -> Option<(u32, u32)> {
        self.screen
    }

    fn color_depth(&self) -> Option<u32> {
        color_depth_from(env_nonempty("COLORTERM").as_deref(), env_nonempty("TERM").as_deref())
    }

    fn timezone(&self) -> Option<String> {
        env_nonempty("TZ").or_else(|| Some(format!("UTC{}", chrono::Local::now().offset())))
    }

    fn logical_cores(&self) -> Option<usize> {
        std::thread::available_parallelism().ok().map(|n| n.get())
    }

    fn memory_class(&self) -> Option<f64> {
        #[cfg(target_os = "linux")]
        {
            let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
            mem_total_kib(&meminfo).map(memory_class_from_kib)
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    fn canvas(&self) -> Option<String> {
        let parts: Vec<String> = ["TERM", "TERM_PROGRAM"]
            .iter()
            .filter_map(|k| env_nonempty(k))
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    fn gpu(&self) -> GpuProbe {
        #[cfg(target_os = "linux")]
        {
            linux_gpu_probe()
        }
        #[cfg(not(target_os = "linux"))]
        {
            GpuProbe::Unavailable
        }
    }
}

#[cfg(target_os = "linux")]
fn linux_gpu_probe() -> GpuProbe {
    let Ok(entries) = std::fs::read_dir("/sys/class/drm") else {
        return GpuProbe::Unavailable;
    };
    let mut cards: Vec<std::path::PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.starts_with("card") && !name.contains('-')
        })
        .map(|e| e.path())
        .collect();
    cards.sort();

    let Some(card) = cards.first() else {
        return GpuProbe::Unavailable;
    };
    std::fs::read_to_string(card.join("device").join("uevent"))
        .ok()
        .and_then(|uevent| driver_from_uevent(&uevent))
        .map_or(GpuProbe::Supported, GpuProbe::Renderer)
}

// ── Parsing helpers ───────────────────────────────────────────────────────────

/// `en_US.UTF-8` → `en-US`. `C` and `POSIX` carry no locale.
pub fn language_tag(locale: &str) -> Option<String> {
    let base = locale.split(|c: char| c == '.' || c == '@').next()?.trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

/// Bits per pixel advertised by the terminal.
pub fn color_depth_from(colorterm: Option<&str>, term: Option<&str>) -> Option<u32> {
    if matches!(colorterm, Some("truecolor") | Some("24bit")) {
        return Some(24);
    }
    match term {
        Some(t) if t.contains("256color") => Some(8),
        Some("dumb") | None => None,
        Some(_) => Some(4),
    }
}

/// Buckets memory like the browser's device-memory hint: the largest of
/// 0.25, 0.5, 1, 2, 4, 8 GiB not above the installed amount.
pub fn memory_class_from_kib(kib: u64) -> f64 {
    const CLASSES: [f64; 6] = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0];
    let gib = kib as f64 / (1024.0 * 1024.0);
    CLASSES
        .iter()
        .rev()
        .copied()
        .find(|&c| c <= gib)
        .unwrap_or(CLASSES[0])
}

pub fn mem_total_kib(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|l| l.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

pub fn driver_from_uevent(uevent: &str) -> Option<String> {
    uevent
        .lines()
        .find_map(|l| l.strip_prefix("DRIVER="))
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fully scripted probe.
    #[derive(Clone)]
    struct FixedProbe {
        screen: Option<(u32, u32)>,
        canvas: Option<String>,
        gpu: GpuProbe,
        cores: Option<usize>,
    }

    impl Default for FixedProbe {
        fn default() -> Self {
            Self {
                screen: Some((1920, 1080)),
                canvas: Some("xterm-256color/WezTerm".into()),
                gpu: GpuProbe::Renderer("amdgpu".into()),
                cores: Some(8),
            }
        }
    }

    impl DeviceProbe for FixedProbe {
        fn user_agent(&self) -> Option<String> {
            Some("elgean/test (linux; x86_64)".into())
        }
        fn language(&self) -> Option<String> {
            Some("en-US".into())
        }
        fn platform(&self) -> Option<String> {
            Some("linux/x86_64".into())
        }
        fn screen(&self) -> Option<(u32, u32)> {
            self.screen
        }
        fn color_depth(&self) -> Option<u32> {
            Some(24)
        }
        fn timezone(&self) -> Option<String> {
            Some("Europe/Athens".into())
        }
        fn logical_cores(&self) -> Option<usize> {
            self.cores
        }
        fn memory_class(&self) -> Option<f64> {
            Some(8.0)
        }
        fn canvas(&self) -> Option<String> {
            self.canvas.clone()
        }
        fn gpu(&self) -> GpuProbe {
            self.gpu.clone()
        }
    }

    /// Every reading unavailable.
    struct BlindProbe;

    impl DeviceProbe for BlindProbe {
        fn user_agent(&self) -> Option<String> {
            None
        }
        fn language(&self) -> Option<String> {
            None
        }
        fn platform(&self) -> Option<String> {
            None
        }
        fn screen(&self) -> Option<(u32, u32)> {
            None
        }
        fn color_depth(&self) -> Option<u32> {
            None
        }
        fn timezone(&self) -> Option<String> {
            None
        }
        fn logical_cores(&self) -> Option<usize> {
            None
        }
        fn memory_class(&self) -> Option<f64> {
            None
        }
        fn canvas(&self) -> Option<String> {
            None
        }
        fn gpu(&self) -> GpuProbe {
            GpuProbe::Unavailable
        }
    }

    #[test]
    fn rolling_hash_matches_reference_values() {
        assert_eq!(rolling_hash(""), "0");
        assert_eq!(rolling_hash("a"), "61");
        assert_eq!(rolling_hash("ab"), "c21");
        assert_eq!(rolling_hash("no-ip"), "64144b3");
        assert_eq!(rolling_hash("127.0.0.1"), "59c3b57d");
        assert_eq!(rolling_hash("Radio Elgean"), "419aeeb7");
    }

    #[test]
    fn rolling_hash_uses_utf16_units() {
        // é is one unit, the emoji is a surrogate pair
        assert_eq!(rolling_hash("é😀"), "1e780c");
    }

    #[test]
    fn rolling_hash_handles_i32_min() {
        // wraps to exactly i32::MIN
        assert_eq!(rolling_hash("xfjfxtf"), "80000000");
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let probe = FixedProbe::default();
        let a = compute_device_fingerprint(&probe);
        let b = compute_device_fingerprint(&probe);
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_devices_usually_differ() {
        let base = compute_device_fingerprint(&FixedProbe::default());
        let variants = [
            FixedProbe {
                screen: Some((2560, 1440)),
                ..FixedProbe::default()
            },
            FixedProbe {
                cores: Some(4),
                ..FixedProbe::default()
            },
            FixedProbe {
                canvas: None,
                ..FixedProbe::default()
            },
            FixedProbe {
                gpu: GpuProbe::Supported,
                ..FixedProbe::default()
            },
        ];
        let mut seen = std::collections::HashSet::new();
        seen.insert(base);
        for probe in &variants {
            assert!(seen.insert(compute_device_fingerprint(probe)));
        }
    }

    #[test]
    fn unavailable_readings_degrade_to_sentinels() {
        let attrs = DeviceAttributes::collect(&BlindProbe);
        assert_eq!(attrs.user_agent, UNKNOWN);
        assert_eq!(attrs.screen_resolution, UNKNOWN);
        assert_eq!(attrs.canvas, CANVAS_UNAVAILABLE);
        assert_eq!(attrs.gpu, GPU_UNAVAILABLE);
        assert!(attrs.canonical().contains(r#""hardwareConcurrency":"unknown""#));
        assert!(!attrs.fingerprint().is_empty());
    }

    #[test]
    fn canonical_form_keeps_field_order() {
        let json = DeviceAttributes::collect(&FixedProbe::default()).canonical();
        let keys = [
            "userAgent",
            "language",
            "platform",
            "screenResolution",
            "screenColorDepth",
            "timezone",
            "hardwareConcurrency",
            "deviceMemory",
            "canvas",
            "gpu",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| json.find(&format!("\"{}\"", k)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(json.contains(r#""screenResolution":"1920x1080""#));
        assert!(json.contains(r#""deviceMemory":8,"#));
    }

    #[test]
    fn probe_strings_are_truncated() {
        let probe = FixedProbe {
            canvas: Some("x".repeat(80)),
            gpu: GpuProbe::Renderer("r".repeat(64)),
            ..FixedProbe::default()
        };
        let attrs = DeviceAttributes::collect(&probe);
        assert_eq!(attrs.canvas.len(), 50);
        assert_eq!(attrs.gpu.len(), 30);
    }

    #[test]
    fn composite_id_falls_back_to_device_hash() {
        let with_net = ListenerIdentity {
            network_hash: Some("59c3b57d".into()),
            device_hash: "1f2e3d".into(),
        };
        assert_eq!(with_net.composite_id(), "59c3b57d-1f2e3d");

        let device_only = ListenerIdentity {
            network_hash: None,
            device_hash: "1f2e3d".into(),
        };
        assert_eq!(device_only.composite_id(), "1f2e3d");
    }

    #[test]
    fn locale_parsing() {
        assert_eq!(language_tag("en_US.UTF-8").as_deref(), Some("en-US"));
        assert_eq!(language_tag("el_GR@euro").as_deref(), Some("el-GR"));
        assert_eq!(language_tag("C.UTF-8"), None);
        assert_eq!(language_tag("POSIX"), None);
    }

    #[test]
    fn color_depth_detection() {
        assert_eq!(color_depth_from(Some("truecolor"), Some("xterm")), Some(24));
        assert_eq!(color_depth_from(None, Some("screen-256color")), Some(8));
        assert_eq!(color_depth_from(None, Some("vt100")), Some(4));
        assert_eq!(color_depth_from(None, Some("dumb")), None);
        assert_eq!(color_depth_from(None, None), None);
    }

    #[test]
    fn memory_buckets() {
        assert_eq!(memory_class_from_kib(16 * 1024 * 1024), 8.0);
        assert_eq!(memory_class_from_kib(3 * 1024 * 1024), 2.0);
        assert_eq!(memory_class_from_kib(700 * 1024), 0.5);
        assert_eq!(memory_class_from_kib(1024), 0.25);
    }

    #[test]
    fn proc_file_parsing() {
        let meminfo = "MemTotal:       16314404 kB\nMemFree:         1234 kB\n";
        assert_eq!(mem_total_kib(meminfo), Some(16_314_404));
        assert_eq!(mem_total_kib("garbage"), None);

        let uevent = "DRIVER=amdgpu\nPCI_CLASS=30000\n";
        assert_eq!(driver_from_uevent(uevent).as_deref(), Some("amdgpu"));
        assert_eq!(driver_from_uevent("PCI_CLASS=30000\n"), None);
    }
}
