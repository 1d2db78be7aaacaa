//! Captcha challenge rendering.
//!
//! Challenges are SVG images of a short random string. Glyphs are drawn as
//! stroked outlines so the markup carries no text. Solutions are compared
//! case-insensitively, so the alphabet leaves out glyphs that are easy to
//! confuse with each other (`o O 0 i I l L 1`).

use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt::Write;

const ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyzABCDEFGHJKMNPQRSTUVWXYZ";
const WIDTH: u32 = 150;
const HEIGHT: u32 = 50;

type Stroke = &'static [(u8, u8)];

/// Stroke outlines on a 4x6 grid, origin top left.
fn glyph(c: char) -> Option<&'static [Stroke]> {
    let strokes: &'static [Stroke] = match c.to_ascii_uppercase() {
        '2' => &[&[(0, 1), (1, 0), (3, 0), (4, 1), (4, 2), (0, 6), (4, 6)]],
        '3' => &[&[(0, 0), (4, 0), (2, 2), (3, 2), (4, 3), (4, 5), (3, 6), (1, 6), (0, 5)]],
        '4' => &[&[(3, 6), (3, 0), (0, 4), (4, 4)]],
        '5' => &[&[(4, 0), (0, 0), (0, 3), (3, 3), (4, 4), (4, 5), (3, 6), (0, 6)]],
        '6' => &[&[(4, 0), (2, 0), (0, 2), (0, 5), (1, 6), (3, 6), (4, 5), (4, 4), (3, 3), (0, 3)]],
        '7' => &[&[(0, 0), (4, 0), (1, 6)]],
        '8' => &[
            &[(1, 0), (3, 0), (4, 1), (4, 2), (3, 3), (1, 3), (0, 2), (0, 1), (1, 0)],
            &[(1, 3), (0, 4), (0, 5), (1, 6), (3, 6), (4, 5), (4, 4), (3, 3)],
        ],
        '9' => &[&[(4, 3), (1, 3), (0, 2), (0, 1), (1, 0), (3, 0), (4, 1), (4, 4), (2, 6), (0, 6)]],
        'A' => &[&[(0, 6), (2, 0), (4, 6)], &[(1, 3), (3, 3)]],
        'B' => &[
            &[(0, 0), (0, 6), (3, 6), (4, 5), (4, 4), (3, 3), (0, 3)],
            &[(0, 0), (3, 0), (4, 1), (4, 2), (3, 3)],
        ],
        'C' => &[&[(4, 1), (3, 0), (1, 0), (0, 1), (0, 5), (1, 6), (3, 6), (4, 5)]],
        'D' => &[&[(0, 0), (0, 6), (2, 6), (4, 4), (4, 2), (2, 0), (0, 0)]],
        'E' => &[&[(4, 0), (0, 0), (0, 6), (4, 6)], &[(0, 3), (3, 3)]],
        'F' => &[&[(4, 0), (0, 0), (0, 6)], &[(0, 3), (3, 3)]],
        'G' => &[&[(4, 1), (3, 0), (1, 0), (0, 1), (0, 5), (1, 6), (3, 6), (4, 5), (4, 3), (2, 3)]],
        'H' => &[&[(0, 0), (0, 6)], &[(4, 0), (4, 6)], &[(0, 3), (4, 3)]],
        'J' => &[&[(4, 0), (4, 5), (3, 6), (1, 6), (0, 5)]],
        'K' => &[&[(0, 0), (0, 6)], &[(4, 0), (0, 4)], &[(1, 3), (4, 6)]],
        'M' => &[&[(0, 6), (0, 0), (2, 3), (4, 0), (4, 6)]],
        'N' => &[&[(0, 6), (0, 0), (4, 6), (4, 0)]],
        'P' => &[&[(0, 6), (0, 0), (3, 0), (4, 1), (4, 2), (3, 3), (0, 3)]],
        'Q' => &[
            &[(1, 0), (3, 0), (4, 1), (4, 5), (3, 6), (1, 6), (0, 5), (0, 1), (1, 0)],
            &[(2, 4), (4, 6)],
        ],
        'R' => &[&[(0, 6), (0, 0), (3, 0), (4, 1), (4, 2), (3, 3), (0, 3)], &[(2, 3), (4, 6)]],
        'S' => &[&[
            (4, 1),
            (3, 0),
            (1, 0),
            (0, 1),
            (0, 2),
            (1, 3),
            (3, 3),
            (4, 4),
            (4, 5),
            (3, 6),
            (1, 6),
            (0, 5),
        ]],
        'T' => &[&[(0, 0), (4, 0)], &[(2, 0), (2, 6)]],
        'U' => &[&[(0, 0), (0, 5), (1, 6), (3, 6), (4, 5), (4, 0)]],
        'V' => &[&[(0, 0), (2, 6), (4, 0)]],
        'W' => &[&[(0, 0), (1, 6), (2, 3), (3, 6), (4, 0)]],
        'X' => &[&[(0, 0), (4, 6)], &[(4, 0), (0, 6)]],
        'Y' => &[&[(0, 0), (2, 3), (4, 0)], &[(2, 3), (2, 6)]],
        'Z' => &[&[(0, 0), (4, 0), (0, 6), (4, 6)]],
        _ => return None,
    };
    Some(strokes)
}

/// A rendered challenge and its plaintext answer
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Markup sent to the client
    pub markup: String,
    /// Expected answer
    pub solution: String,
}

/// Produces captcha challenges.
pub trait ChallengeRenderer: Send + Sync {
    fn render(&self) -> Challenge;
}

/// SVG captcha with noise lines and distorted stroke glyphs
#[derive(Debug, Clone)]
pub struct SvgCaptcha {
    pub size: usize,
    pub noise: usize,
}

impl Default for SvgCaptcha {
    fn default() -> Self {
        Self { size: 6, noise: 10 }
    }
}

impl SvgCaptcha {
    pub fn new(size: usize, noise: usize) -> Self {
        Self { size, noise }
    }

    fn random_text(&self, rng: &mut impl Rng) -> String {
        (0..self.size)
            .filter_map(|_| ALPHABET.choose(rng).map(|&b| b as char))
            .collect()
    }

    fn random_color(rng: &mut impl Rng, low: u8) -> String {
        format!(
            "rgb({},{},{})",
            rng.gen_range(low..=255),
            rng.gen_range(low..=255),
            rng.gen_range(low..=255)
        )
    }

    /// Path data for one glyph centred on (`cx`, `cy`).
    fn glyph_path(strokes: &[Stroke], cx: f32, cy: f32, rng: &mut impl Rng) -> String {
        let scale = rng.gen_range(4.5..6.0_f32);
        let (sin, cos) = rng.gen_range(-0.35..0.35_f32).sin_cos();
        let shear = rng.gen_range(-0.25..0.25_f32);

        let mut d = String::new();
        for stroke in strokes {
            for (i, &(gx, gy)) in stroke.iter().enumerate() {
                let lx = (gx as f32 - 2.0 + shear * (gy as f32 - 3.0)) * scale + rng.gen_range(-0.8..0.8);
                let ly = (gy as f32 - 3.0) * scale + rng.gen_range(-0.8..0.8);
                let x = cx + lx * cos - ly * sin;
                let y = cy + lx * sin + ly * cos;
                let op = if i == 0 { 'M' } else { 'L' };
                let _ = write!(d, "{}{:.1} {:.1} ", op, x, y);
            }
        }
        d.trim_end().to_string()
    }

    fn draw(&self, text: &str, rng: &mut impl Rng) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0,0,{w},{h}">"#,
            w = WIDTH,
            h = HEIGHT
        );

        for _ in 0..self.noise {
            let (x1, y1) = (rng.gen_range(0..WIDTH / 4), rng.gen_range(0..HEIGHT));
            let (x2, y2) = (rng.gen_range(WIDTH * 3 / 4..WIDTH), rng.gen_range(0..HEIGHT));
            let (cx, cy) = (rng.gen_range(0..WIDTH), rng.gen_range(0..HEIGHT));
            let _ = write!(
                svg,
                r#"<path d="M{} {} Q{} {} {} {}" stroke="{}" fill="none"/>"#,
                x1,
                y1,
                cx,
                cy,
                x2,
                y2,
                Self::random_color(rng, 60)
            );
        }

        let slot = WIDTH as f32 / (text.chars().count() as f32 + 1.0);
        for (i, c) in text.chars().enumerate() {
            let Some(strokes) = glyph(c) else { continue };
            let cx = slot * (i as f32 + 1.0) + rng.gen_range(-3.0..3.0);
            let cy = HEIGHT as f32 / 2.0 + rng.gen_range(-4.0..4.0);
            let _ = write!(
                svg,
                r#"<path d="{}" stroke="{}" stroke-width="{:.1}" stroke-linecap="round" stroke-linejoin="round" fill="none"/>"#,
                Self::glyph_path(strokes, cx, cy, rng),
                Self::random_color(rng, 20),
                rng.gen_range(2.0..3.2_f32)
            );
        }

        svg.push_str("</svg>");
        svg
    }
}

impl ChallengeRenderer for SvgCaptcha {
    fn render(&self) -> Challenge {
        let mut rng = rand::thread_rng();
        let solution = self.random_text(&mut rng);
        let markup = self.draw(&solution, &mut rng);
        Challenge { markup, solution }
    }
}
