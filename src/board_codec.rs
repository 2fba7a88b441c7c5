//! Fixed-width position encoding shared by the harness and the engines.
//!
//! A serialized position is exactly 136 ASCII digits:
//!
//! | chars     | content                                                         |
//! |-----------|-----------------------------------------------------------------|
//! | `0..128`  | 64 squares in FEN order (a8 first), two digits each: type, color |
//! | `128..132`| castling rights `KQkq`, one binary digit each                   |
//! | `132..135`| en passant target index, `000` for none                         |
//! | `135`     | side to move, `0` white / `1` black                             |
//!
//! Empty squares are encoded as `99`.

use std::fmt;

use crate::error::{HarnessError, Result};

/// Length of a serialized position.
pub const ENCODED_LEN: usize = 136;

const SQUARES_LEN: usize = 128;
const EMPTY_SQUARE: &str = "99";

// En passant index = file + 16 * (4 + k) + 4, with k = 5 on rank 3 and k = 4 on rank 6.
const EP_RANK3_BASE: u16 = 16 * (4 + 5) + 4;
const EP_RANK6_BASE: u16 = 16 * (4 + 4) + 4;

const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -";

/// Side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Color {
    /// Encoded as `0`.
    White,
    /// Encoded as `1`.
    Black,
}

impl Color {
    /// The opposing side.
    pub fn other(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Digit used both in the encoding and on the engine command line.
    pub fn digit(self) -> char {
        match self {
            Color::White => '0',
            Color::Black => '1',
        }
    }

    fn from_digit(c: char) -> Option<Color> {
        match c {
            '0' => Some(Color::White),
            '1' => Some(Color::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// Piece type, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ];

    fn code(self) -> u8 {
        self as u8
    }

    fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }
}

/// A colored piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }

    /// FEN letter, uppercase for white.
    pub fn fen_char(self) -> char {
        match self.color {
            Color::White => self.kind.letter().to_ascii_uppercase(),
            Color::Black => self.kind.letter(),
        }
    }

    fn from_fen_char(c: char) -> Option<Piece> {
        let kind = PieceKind::ALL
            .into_iter()
            .find(|kind| kind.letter() == c.to_ascii_lowercase())?;
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Some(Piece::new(kind, color))
    }
}

/// Castling availability, in the fixed order white-kingside, white-queenside, black-kingside,
/// black-queenside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    fn bits(self) -> [bool; 4] {
        [
            self.white_kingside,
            self.white_queenside,
            self.black_kingside,
            self.black_queenside,
        ]
    }

    fn from_bits(bits: [bool; 4]) -> Self {
        Self {
            white_kingside: bits[0],
            white_queenside: bits[1],
            black_kingside: bits[2],
            black_queenside: bits[3],
        }
    }
}

/// En passant target square. Only ranks 3 and 6 can hold one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnPassant {
    /// 0 for the a-file through 7 for the h-file.
    pub file: u8,
    /// Either 3 or 6.
    pub rank: u8,
}

impl EnPassant {
    fn index(self) -> u16 {
        let base = if self.rank == 3 {
            EP_RANK3_BASE
        } else {
            EP_RANK6_BASE
        };
        base + self.file as u16
    }

    fn from_index(index: u16) -> Option<EnPassant> {
        match index {
            i if (EP_RANK3_BASE..EP_RANK3_BASE + 8).contains(&i) => Some(EnPassant {
                file: (i - EP_RANK3_BASE) as u8,
                rank: 3,
            }),
            i if (EP_RANK6_BASE..EP_RANK6_BASE + 8).contains(&i) => Some(EnPassant {
                file: (i - EP_RANK6_BASE) as u8,
                rank: 6,
            }),
            _ => None,
        }
    }
}

/// A complete board state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    /// FEN order: index 0 is a8, index 63 is h1.
    pub squares: [Option<Piece>; 64],
    pub castling: CastlingRights,
    pub en_passant: Option<EnPassant>,
    pub side_to_move: Color,
}

impl Position {
    /// The standard initial position, white to move.
    pub fn starting() -> Position {
        decode_fen(STARTING_FEN).expect("starting FEN is well-formed")
    }

    /// Parse the 136-character serialized form.
    pub fn decode(encoded: &str) -> Result<Position> {
        if encoded.len() != ENCODED_LEN || !encoded.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HarnessError::Format(format!(
                "expected {ENCODED_LEN} digits, got {encoded:?}"
            )));
        }
        let bytes = encoded.as_bytes();

        let mut squares = [None; 64];
        for (i, square) in squares.iter_mut().enumerate() {
            let code = &encoded[i * 2..i * 2 + 2];
            if code == EMPTY_SQUARE {
                continue;
            }
            let kind = PieceKind::ALL
                .get((bytes[i * 2] - b'0') as usize)
                .copied();
            let color = Color::from_digit(bytes[i * 2 + 1] as char);
            let (Some(kind), Some(color)) = (kind, color) else {
                return Err(HarnessError::Format(format!(
                    "invalid square code {code:?} at index {i}"
                )));
            };
            *square = Some(Piece::new(kind, color));
        }

        let mut bits = [false; 4];
        for (bit, &b) in bits.iter_mut().zip(&bytes[SQUARES_LEN..SQUARES_LEN + 4]) {
            *bit = match b {
                b'0' => false,
                b'1' => true,
                _ => {
                    return Err(HarnessError::Format(format!(
                        "castling digit must be binary, got {:?}",
                        b as char
                    )))
                }
            };
        }

        let ep_digits = &encoded[SQUARES_LEN + 4..SQUARES_LEN + 7];
        // three ascii digits always fit
        let ep_index: u16 = ep_digits.parse().unwrap_or_default();
        let en_passant = match ep_index {
            0 => None,
            i => Some(EnPassant::from_index(i).ok_or_else(|| {
                HarnessError::Format(format!("{ep_digits} is not an en passant target"))
            })?),
        };

        let side_to_move = Color::from_digit(bytes[ENCODED_LEN - 1] as char).ok_or_else(|| {
            HarnessError::Format(format!(
                "side to move must be 0 or 1, got {:?}",
                bytes[ENCODED_LEN - 1] as char
            ))
        })?;

        Ok(Position {
            squares,
            castling: CastlingRights::from_bits(bits),
            en_passant,
            side_to_move,
        })
    }

    /// Render the first four FEN fields.
    pub fn to_fen(&self) -> String {
        let mut placement = String::new();
        for (rank, row) in self.squares.chunks(8).enumerate() {
            if rank > 0 {
                placement.push('/');
            }
            let mut empty = 0;
            for square in row {
                match square {
                    Some(piece) => {
                        if empty > 0 {
                            placement.push_str(&empty.to_string());
                            empty = 0;
                        }
                        placement.push(piece.fen_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                placement.push_str(&empty.to_string());
            }
        }

        let side = match self.side_to_move {
            Color::White => "w",
            Color::Black => "b",
        };

        let castling: String = self
            .castling
            .bits()
            .into_iter()
            .zip(['K', 'Q', 'k', 'q'])
            .filter_map(|(set, c)| set.then_some(c))
            .collect();
        let castling = if castling.is_empty() {
            "-".to_string()
        } else {
            castling
        };

        let en_passant = match self.en_passant {
            Some(ep) => format!("{}{}", (b'a' + ep.file) as char, ep.rank),
            None => "-".to_string(),
        };

        format!("{placement} {side} {castling} {en_passant}")
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (rank, row) in self.squares.chunks(8).enumerate() {
            write!(f, "{} ", 8 - rank)?;
            for square in row {
                let c = square.map(Piece::fen_char).unwrap_or('.');
                write!(f, " {c}")?;
            }
            writeln!(f)?;
        }
        write!(f, "   a b c d e f g h   {} to move", self.side_to_move)
    }
}

/// Decode the placement, side to move, castling and en passant fields of a FEN string.
///
/// Trailing halfmove/fullmove fields are accepted and ignored.
pub fn decode_fen(fen: &str) -> Result<Position> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let [placement, side, castling, en_passant, ..] = fields[..] else {
        return Err(HarnessError::Format(format!(
            "FEN needs placement, side, castling and en passant fields: {fen:?}"
        )));
    };

    let mut squares = Vec::with_capacity(64);
    for c in placement.chars() {
        match c {
            '/' => {}
            '1'..='8' => squares.extend(std::iter::repeat(None).take(c as usize - '0' as usize)),
            _ => {
                let piece = Piece::from_fen_char(c).ok_or_else(|| {
                    HarnessError::Format(format!("unknown piece {c:?} in {placement:?}"))
                })?;
                squares.push(Some(piece));
            }
        }
    }
    let squares: [Option<Piece>; 64] = squares.try_into().map_err(|v: Vec<_>| {
        HarnessError::Format(format!("placement has {} squares instead of 64", v.len()))
    })?;

    let side_to_move = if side == "w" || side == "W" {
        Color::White
    } else {
        Color::Black
    };

    let castling = CastlingRights::from_bits([
        castling.contains('K'),
        castling.contains('Q'),
        castling.contains('k'),
        castling.contains('q'),
    ]);

    let en_passant = match en_passant {
        "-" => None,
        target => Some(parse_en_passant(target)?),
    };

    Ok(Position {
        squares,
        castling,
        en_passant,
        side_to_move,
    })
}

fn parse_en_passant(target: &str) -> Result<EnPassant> {
    let bytes = target.as_bytes();
    match bytes {
        [file @ b'a'..=b'h', rank @ (b'3' | b'6')] => Ok(EnPassant {
            file: file - b'a',
            rank: rank - b'0',
        }),
        _ => Err(HarnessError::Format(format!(
            "invalid en passant target {target:?}"
        ))),
    }
}

/// Serialize a position into its 136-character form.
pub fn encode(position: &Position) -> String {
    let mut out = String::with_capacity(ENCODED_LEN);
    for square in &position.squares {
        match square {
            Some(piece) => {
                out.push((b'0' + piece.kind.code()) as char);
                out.push(piece.color.digit());
            }
            None => out.push_str(EMPTY_SQUARE),
        }
    }
    for bit in position.castling.bits() {
        out.push(if bit { '1' } else { '0' });
    }
    let ep = position.en_passant.map(EnPassant::index).unwrap_or(0);
    out.push_str(&format!("{ep:03}"));
    out.push(position.side_to_move.digit());
    out
}
