use super::chain::Chain;
use super::error::ParseStrategyError;
use core::fmt;
use core::str::FromStr;

/// How a free block is picked for an allocation request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// First free block, in address order, that is large enough.
    #[default]
    FirstFit,
    /// Smallest free block that is large enough. Ties go to the lower address.
    BestFit,
}

impl Strategy {
    pub(crate) fn select<const N: usize>(self, chain: &Chain<N>, size: usize) -> Option<usize> {
        match self {
            Strategy::FirstFit => find_first(chain, size),
            Strategy::BestFit => find_best(chain, size),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::FirstFit => f.write_str("first-fit"),
            Strategy::BestFit => f.write_str("best-fit"),
        }
    }
}

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first-fit" | "first_fit" | "firstfit" => Ok(Strategy::FirstFit),
            "best" | "best-fit" | "best_fit" | "bestfit" => Ok(Strategy::BestFit),
            _ => Err(ParseStrategyError(s.to_owned())),
        }
    }
}

// walks the chain from the head and stops at the first free block with enough space
fn find_first<const N: usize>(chain: &Chain<N>, size: usize) -> Option<usize> {
    chain
        .blocks()
        .find(|(_, header)| header.free && header.size >= size)
        .map(|(block, _)| block)
}

// iterates over the entire chain and keeps the tightest fit
fn find_best<const N: usize>(chain: &Chain<N>, size: usize) -> Option<usize> {
    let mut best_block: Option<usize> = None;
    let mut smallest_size = usize::MAX;

    for (block, header) in chain.blocks() {
        // strict comparison keeps the first block seen on ties
        if header.free && header.size >= size && header.size < smallest_size {
            best_block = Some(block);
            smallest_size = header.size;
        }
    }

    best_block
}
