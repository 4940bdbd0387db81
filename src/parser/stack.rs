use crate::global::commands::{BlockPos, BlockType};
use crate::values::attribs::VarScope;

// open parenthesis frame flags

/// The parenthesis opens a user function call or definition.
pub const FLAG_USER_FUNC: u8 = 0x01;
/// The called user function was already defined when the call was parsed.
pub const FLAG_USER_FUNC_DEFINED: u8 = 0x02;
/// The parenthesis opens a built-in function call.
pub const FLAG_INTERNAL_FUNC: u8 = 0x04;
/// Plain grouping parenthesis (no function, no array).
pub const FLAG_OPEN_PAREN_ONLY: u8 = 0x08;
/// The parenthesis opens array subscripts (or an array declaration).
pub const FLAG_ARRAY: u8 = 0x10;
/// After the closing parenthesis, assignment to the array element is allowed.
pub const FLAG_ARRAY_ELEM_ASSIGNMENT_ALLOWED: u8 = 0x20;
/// After the closing parenthesis, postfix ++/-- of the array element is allowed.
pub const FLAG_ARRAY_ELEM_INCR_DECR_ALLOWED: u8 = 0x40;

/// Parse-time state of one open parenthesis.
#[derive(Debug, Clone)]
pub struct OpenParenFrame {
    /// Functions: allowed argument count range, if the definition (or a
    /// previous complete call) is known. A plain parenthesis uses 1/1.
    pub min_args: u8,
    pub max_args: u8,
    /// Previously declared arrays: dimension count; 0 for a new array or a scalar.
    pub array_dim_count: u8,
    /// Functions and variables: index into the name table.
    pub identifier_index: u8,
    pub variable_scope: VarScope,
    /// Arguments (or subscripts) parsed so far.
    pub arg_count: u8,
    /// Bit per argument position: the argument is a whole (unsubscripted)
    /// array variable.
    pub arg_array_mask: u16,
    pub flags: u8,
}

/// Parse-time state of one open command block.
#[derive(Debug, Clone)]
pub struct OpenBlockFrame {
    pub block_type: BlockType,
    /// Position of the last block command parsed at this level.
    pub pos: BlockPos,
    /// Token step of the block start command.
    pub start_step: u16,
    /// Token step of the last block command at this level (chain tail).
    pub last_step: u16,
    /// Function definition blocks only.
    pub function_index: u8,
}

/// The parsing stack tracks open parentheses and open blocks, interleaved in
/// nesting order. Sequence checks between block commands read the innermost
/// open block; parenthesis bookkeeping reads the innermost open parenthesis.
#[derive(Debug, Clone)]
pub enum StackFrame {
    Paren(OpenParenFrame),
    Block(OpenBlockFrame),
}

#[derive(Debug, Default)]
pub struct ParsingStack {
    frames: Vec<StackFrame>,
}

impl ParsingStack {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn push_paren(&mut self, frame: OpenParenFrame) {
        self.frames.push(StackFrame::Paren(frame));
    }

    pub fn push_block(&mut self, frame: OpenBlockFrame) {
        self.frames.push(StackFrame::Block(frame));
    }

    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    /// Innermost open parenthesis; the top frame is a parenthesis whenever the
    /// parser is inside one (blocks cannot open inside an expression).
    pub fn top_paren_mut(&mut self) -> Option<&mut OpenParenFrame> {
        match self.frames.last_mut() {
            Some(StackFrame::Paren(frame)) => Some(frame),
            _ => None,
        }
    }

    pub fn top_paren(&self) -> Option<&OpenParenFrame> {
        match self.frames.last() {
            Some(StackFrame::Paren(frame)) => Some(frame),
            _ => None,
        }
    }

    /// Innermost open block (skipping any parenthesis frames above it).
    pub fn top_block_mut(&mut self) -> Option<&mut OpenBlockFrame> {
        self.frames.iter_mut().rev().find_map(|frame| match frame {
            StackFrame::Block(block) => Some(block),
            _ => None,
        })
    }

    pub fn top_block(&self) -> Option<&OpenBlockFrame> {
        self.frames.iter().rev().find_map(|frame| match frame {
            StackFrame::Block(block) => Some(block),
            _ => None,
        })
    }

    /// Nearest enclosing loop block (for break and continue).
    pub fn enclosing_loop(&self) -> Option<&OpenBlockFrame> {
        self.frames.iter().rev().find_map(|frame| match frame {
            StackFrame::Block(block)
                if matches!(block.block_type, BlockType::For | BlockType::While) =>
            {
                Some(block)
            }
            _ => None,
        })
    }

    /// Nearest enclosing function definition block (for return).
    pub fn enclosing_function(&self) -> Option<&OpenBlockFrame> {
        self.frames.iter().rev().find_map(|frame| match frame {
            StackFrame::Block(block) if block.block_type == BlockType::Function => Some(block),
            _ => None,
        })
    }
}
