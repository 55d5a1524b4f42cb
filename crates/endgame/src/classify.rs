//! Rook endgame classification.
//!
//! A game is walked position by position and each position is reduced to a
//! [`Material`] record. The trailing run of positions holding nothing but
//! kings and rooks is the played-out tail. The game counts as a rook
//! endgame when the position right before material first dropped below four
//! pieces was exactly king and rook against king and rook.

use shakmaty::{Board, Color, Role};

/// Material summary of a single position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub pieces: usize,
    /// Every piece on the board is a king or a rook.
    pub rook_only: bool,
    /// Exactly one king and one rook per side.
    pub krkr: bool,
}

impl Material {
    pub fn of(board: &Board) -> Self {
        let mut pieces = 0;
        let mut rook_only = true;
        let mut rooks = [0u8; 2];
        let mut kings = [0u8; 2];

        for (_, piece) in board.iter() {
            pieces += 1;
            let side = match piece.color {
                Color::White => 0,
                Color::Black => 1,
            };
            match piece.role {
                Role::King => kings[side] += 1,
                Role::Rook => rooks[side] += 1,
                _ => rook_only = false,
            }
        }

        Self {
            pieces,
            rook_only,
            krkr: pieces == 4 && rooks == [1, 1] && kings == [1, 1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndgameClass {
    pub rook_endgame: bool,
    /// Plies played in the trailing king-and-rook-only run.
    pub played_out: u32,
}

/// Classify a game from the material of every position, starting with the
/// initial position at index 0.
pub fn classify(history: &[Material]) -> EndgameClass {
    let Some(last) = history.len().checked_sub(1) else {
        return EndgameClass::default();
    };
    if !history[last].rook_only {
        return EndgameClass::default();
    }

    let run_start = history
        .iter()
        .rposition(|m| !m.rook_only)
        .map_or(0, |i| i + 1);

    // The start position is not reached by a move.
    let first_played = run_start.max(1);
    let played_out = if last >= first_played {
        (last - first_played + 1) as u32
    } else {
        0
    };

    let rook_endgame = match (run_start..=last).find(|&i| history[i].pieces < 4) {
        Some(dropped) => dropped > 0 && history[dropped - 1].krkr,
        None => history[last].krkr,
    };

    EndgameClass {
        rook_endgame,
        played_out,
    }
}

/// Material tag of a position, strongest pieces first, e.g. `KRvKP`.
pub fn endgame_tag(board: &Board) -> String {
    let side = |color: Color| -> String {
        [
            Role::King,
            Role::Queen,
            Role::Rook,
            Role::Bishop,
            Role::Knight,
            Role::Pawn,
        ]
        .into_iter()
        .flat_map(|role| {
            let count = (board.by_color(color) & board.by_role(role)).count();
            std::iter::repeat_n(role.upper_char(), count)
        })
        .collect()
    };
    format!("{}v{}", side(Color::White), side(Color::Black))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KRKR: Material = Material {
        pieces: 4,
        rook_only: true,
        krkr: true,
    };
    const KRK: Material = Material {
        pieces: 3,
        rook_only: true,
        krkr: false,
    };
    const KRRKR: Material = Material {
        pieces: 5,
        rook_only: true,
        krkr: false,
    };
    const KQK: Material = Material {
        pieces: 3,
        rook_only: false,
        krkr: false,
    };
    const MIDDLEGAME: Material = Material {
        pieces: 20,
        rook_only: false,
        krkr: false,
    };

    #[test]
    fn test_rook_trade_into_krk_is_rook_endgame() {
        let mut history = vec![MIDDLEGAME, KRKR, KRKR, KRKR];
        history.extend(std::iter::repeat_n(KRK, 5));

        let class = classify(&history);
        assert!(class.rook_endgame);
        assert_eq!(class.played_out, 8);
    }

    #[test]
    fn test_unequal_rooks_tail_is_not_rook_endgame() {
        let history = vec![MIDDLEGAME, KRRKR, KRRKR, KRK];
        let class = classify(&history);
        assert!(!class.rook_endgame);
        assert_eq!(class.played_out, 3);
    }

    #[test]
    fn test_krkr_final_position() {
        let history = vec![MIDDLEGAME, KRKR, KRKR];
        assert_eq!(
            classify(&history),
            EndgameClass {
                rook_endgame: true,
                played_out: 2
            }
        );
    }

    #[test]
    fn test_non_rook_final_position() {
        let history = vec![MIDDLEGAME, KRKR, KQK];
        assert_eq!(classify(&history), EndgameClass::default());
        assert_eq!(classify(&[]), EndgameClass::default());
    }

    #[test]
    fn test_start_position_is_not_counted() {
        let history = vec![KRKR, KRK, KRK];
        let class = classify(&history);
        assert!(class.rook_endgame);
        assert_eq!(class.played_out, 2);
    }

    #[test]
    fn test_endgame_tag() {
        let board: Board = "4k3/8/8/8/8/8/r3P3/R3K3".parse().unwrap();
        assert_eq!(endgame_tag(&board), "KRPvKR");
        assert_eq!(Material::of(&board).pieces, 5);
        assert!(!Material::of(&board).rook_only);

        let board: Board = "4k3/8/8/8/8/8/r7/R3K3".parse().unwrap();
        assert_eq!(endgame_tag(&board), "KRvKR");
        assert!(Material::of(&board).krkr);
    }
}
