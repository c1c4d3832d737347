/// Tiny 3x5 bitmap font, used when no TrueType font can be found.
/// Lowercase is drawn as uppercase; unknown characters render as a hollow box.
use image::Rgb;

use crate::types::Frame;

pub fn draw_text_line(frame: &mut Frame, x: u32, y: u32, text: &str, color: Rgb<u8>, scale: u32) {
    let mut cx = x;
    for c in text.chars() {
        draw_char(frame, cx, y, c, color, scale);
        cx += advance(scale);
    }
}

fn advance(scale: u32) -> u32 {
    // 3 columns + 1 spacing
    4 * scale.max(1)
}

fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x3, 0x4, 0x4, 0x4, 0x3],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x3, 0x4, 0x5, 0x5, 0x3],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'J' => [0x1, 0x1, 0x1, 0x5, 0x2],
        'K' => [0x5, 0x5, 0x6, 0x5, 0x5],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'M' => [0x5, 0x7, 0x7, 0x5, 0x5],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x2, 0x5, 0x5, 0x5, 0x2],
        'P' => [0x6, 0x5, 0x6, 0x4, 0x4],
        'Q' => [0x2, 0x5, 0x5, 0x6, 0x3],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'V' => [0x5, 0x5, 0x5, 0x5, 0x2],
        'W' => [0x5, 0x5, 0x7, 0x7, 0x5],
        'X' => [0x5, 0x5, 0x2, 0x5, 0x5],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        'Z' => [0x7, 0x1, 0x2, 0x4, 0x7],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        ':' => [0x0, 0x2, 0x0, 0x2, 0x0],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        ',' => [0x0, 0x0, 0x0, 0x2, 0x4],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        '_' => [0x0, 0x0, 0x0, 0x0, 0x7],
        '/' => [0x1, 0x1, 0x2, 0x4, 0x4],
        '%' => [0x5, 0x1, 0x2, 0x4, 0x5],
        '[' => [0x6, 0x4, 0x4, 0x4, 0x6],
        ']' => [0x3, 0x1, 0x1, 0x1, 0x3],
        '(' => [0x2, 0x4, 0x4, 0x4, 0x2],
        ')' => [0x2, 0x1, 0x1, 0x1, 0x2],
        '!' => [0x2, 0x2, 0x2, 0x0, 0x2],
        '?' => [0x6, 0x1, 0x2, 0x0, 0x2],
        _ => [0x7, 0x5, 0x5, 0x5, 0x7],
    }
}

fn draw_char(frame: &mut Frame, x: u32, y: u32, c: char, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1);
    let (w, h) = frame.dimensions();
    for (row, bits) in glyph(c).iter().enumerate() {
        for col in 0..3u32 {
            if bits & (0x4 >> col) == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let px = x + col * scale + sx;
                    let py = y + row as u32 * scale + sy;
                    if px < w && py < h {
                        frame.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}
