//! Deterministic avatar synthesis.
//!
//! Avatars are symmetric identicons derived from a SHA-256 digest of the
//! contact's display name, encoded as binary PPM (`P6`).

use sha2::{Digest, Sha256};

const GRID: usize = 8;
const CELL_PX: usize = 8;
pub const AVATAR_PX: usize = GRID * CELL_PX;

const BACKGROUND: [u8; 3] = [240, 240, 240];

pub fn identicon(seed: &str) -> Vec<u8> {
    let digest = Sha256::digest(seed.as_bytes());
    let color = [digest[0], digest[1], digest[2]];

    // 4 bytes -> 32 bits -> left half of the grid, mirrored onto the right.
    let bits = u32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);
    let mut cells = [[false; GRID]; GRID];
    for (row, cells_row) in cells.iter_mut().enumerate() {
        for col in 0..GRID / 2 {
            let bit = row * (GRID / 2) + col;
            let on = bits & (1 << bit) != 0;
            cells_row[col] = on;
            cells_row[GRID - 1 - col] = on;
        }
    }

    let header = format!("P6\n{AVATAR_PX} {AVATAR_PX}\n255\n");
    let mut image = Vec::with_capacity(header.len() + AVATAR_PX * AVATAR_PX * 3);
    image.extend_from_slice(header.as_bytes());
    for y in 0..AVATAR_PX {
        for x in 0..AVATAR_PX {
            let pixel = if cells[y / CELL_PX][x / CELL_PX] {
                color
            } else {
                BACKGROUND
            };
            image.extend_from_slice(&pixel);
        }
    }
    image
}
