use colored::Color;

pub const PRIMARY: Color = Color::TrueColor { r: 102, g: 217, b: 239 };
pub const ACCENT: Color = Color::TrueColor { r: 166, g: 226, b: 46 };
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;
pub const IPV4_ADDR: Color = Color::TrueColor { r: 253, g: 151, b: 31 };
pub const IPV4_PREFIX: Color = Color::TrueColor { r: 230, g: 219, b: 116 };
pub const HOSTNAME: Color = Color::TrueColor { r: 174, g: 129, b: 255 };
pub const MISSING: Color = Color::Red;
