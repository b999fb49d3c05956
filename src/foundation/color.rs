use std::fmt;
use std::str::FromStr;

/// Opaque 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `s`, or fall back to `fallback` with a warning.
    ///
    /// Colors come from user input and a bad one must never abort a render.
    pub fn parse_or(s: &str, fallback: Rgb8) -> Rgb8 {
        match s.parse::<Rgb8>() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(color = s, %fallback, "{e}; using fallback color");
                fallback
            }
        }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl fmt::Display for Rgb8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb8 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('#') {
            return parse_hex(s);
        }
        if let Some(c) = named(&s.to_ascii_lowercase()) {
            return Ok(c);
        }
        // Bare hex digits ("ff0000") are accepted too.
        parse_hex(s).map_err(|_| format!("unrecognized color \"{s}\""))
    }
}

fn parse_hex(s: &str) -> Result<Rgb8, String> {
    let s = s.strip_prefix('#').unwrap_or(s);
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("invalid hex color \"{s}\""));
    }

    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    fn hex_nibble(c: &str) -> Result<u8, String> {
        let v = u8::from_str_radix(c, 16).map_err(|_| format!("invalid hex digit \"{c}\""))?;
        Ok(v * 17)
    }

    match s.len() {
        3 => Ok(Rgb8::new(
            hex_nibble(&s[0..1])?,
            hex_nibble(&s[1..2])?,
            hex_nibble(&s[2..3])?,
        )),
        // Alpha is accepted and dropped: frames are always opaque.
        6 | 8 => Ok(Rgb8::new(
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
        )),
        _ => Err("hex color must be #RGB, #RRGGBB or #RRGGBBAA (case-insensitive)".to_owned()),
    }
}

fn named(name: &str) -> Option<Rgb8> {
    let c = match name {
        "black" => Rgb8::new(0, 0, 0),
        "white" => Rgb8::new(255, 255, 255),
        "red" => Rgb8::new(255, 0, 0),
        "green" => Rgb8::new(0, 128, 0),
        "lime" => Rgb8::new(0, 255, 0),
        "blue" => Rgb8::new(0, 0, 255),
        "navy" => Rgb8::new(0, 0, 128),
        "gray" | "grey" => Rgb8::new(128, 128, 128),
        "silver" => Rgb8::new(192, 192, 192),
        "yellow" => Rgb8::new(255, 255, 0),
        "olive" => Rgb8::new(128, 128, 0),
        "cyan" | "aqua" => Rgb8::new(0, 255, 255),
        "teal" => Rgb8::new(0, 128, 128),
        "magenta" | "fuchsia" => Rgb8::new(255, 0, 255),
        "purple" => Rgb8::new(128, 0, 128),
        "maroon" => Rgb8::new(128, 0, 0),
        "orange" => Rgb8::new(255, 165, 0),
        _ => return None,
    };
    Some(c)
}
