use std::collections::HashMap;

use once_cell::sync::Lazy;

pub const FONT_HEIGHT: usize = 5;
const FONT_WIDTH: usize = 3;
const FILL_CHAR: char = '█';

type Glyph = [&'static str; FONT_HEIGHT];

static GLYPHS: Lazy<HashMap<char, Glyph>> = Lazy::new(|| {
    HashMap::from([
        ('0', ["111", "1 1", "1 1", "1 1", "111"]),
        ('1', [" 1 ", "11 ", " 1 ", " 1 ", "111"]),
        ('2', ["111", "  1", "111", "1  ", "111"]),
        ('3', ["111", "  1", " 11", "  1", "111"]),
        ('4', ["1 1", "1 1", "111", "  1", "  1"]),
        ('5', ["111", "1  ", "111", "  1", "111"]),
        ('6', ["111", "1  ", "111", "1 1", "111"]),
        ('7', ["111", "  1", "  1", " 1 ", " 1 "]),
        ('8', ["111", "1 1", "111", "1 1", "111"]),
        ('9', ["111", "1 1", "111", "  1", "111"]),
        (':', ["   ", " 1 ", "   ", " 1 ", "   "]),
        (' ', ["   ", "   ", "   ", "   ", "   "]),
    ])
});

/// Render `text` (digits, `:` and spaces) as block rows. Unknown characters
/// render blank.
pub fn render(text: &str) -> Vec<String> {
    let content: Vec<char> = text.chars().collect();
    if content.is_empty() {
        return vec![String::new(); FONT_HEIGHT];
    }

    let glyph_width = FONT_WIDTH * 2;
    let spacing = 1;
    let total_width = content.len() * glyph_width + content.len().saturating_sub(1) * spacing;
    let mut canvas = vec![vec![' '; total_width]; FONT_HEIGHT];

    for (index, ch) in content.iter().enumerate() {
        let Some(glyph) = GLYPHS.get(ch) else {
            continue;
        };
        paint_glyph(&mut canvas, glyph, index * (glyph_width + spacing));
    }

    canvas
        .into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect()
}

/// Columns `render` needs for `text`.
pub fn width(text: &str) -> usize {
    let count = text.chars().count();
    count * FONT_WIDTH * 2 + count.saturating_sub(1)
}

fn paint_glyph(canvas: &mut [Vec<char>], glyph: &Glyph, x_offset: usize) {
    for (row_idx, row) in glyph.iter().enumerate() {
        for (col_idx, symbol) in row.chars().enumerate() {
            if symbol != '1' {
                continue;
            }
            let x = x_offset + col_idx * 2;
            if let Some(cells) = canvas.get_mut(row_idx) {
                for cell in cells.iter_mut().skip(x).take(2) {
                    *cell = FILL_CHAR;
                }
            }
        }
    }
}
