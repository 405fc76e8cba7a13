/// Places where boxes are kept: bounded stacks inside the warehouse and
/// unbounded buffer points at its boundary. Both give last-in-first-out
/// access through [`BoxStorage`].

pub type BoxId = String;
pub type StackId = u32;

/// How many boxes a storage can hold, or still take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Bounded(usize),
    /// Buffer points model external depots and never fill up.
    Unbounded,
}

impl Capacity {
    /// True when at least `count` more boxes fit.
    pub fn fits(&self, count: usize) -> bool {
        match self {
            Capacity::Bounded(free) => *free >= count,
            Capacity::Unbounded => true,
        }
    }
}

/// Uniform push/pop/peek/capacity access shared by stacks and buffer points.
pub trait BoxStorage {
    fn id(&self) -> u32;
    fn name(&self) -> &str;

    /// Puts a box on top. Hands the box back when there is no room.
    fn push(&mut self, box_id: BoxId) -> Result<(), BoxId>;
    fn pop(&mut self) -> Option<BoxId>;
    fn peek(&self) -> Option<&BoxId>;
    fn len(&self) -> usize;
    fn capacity(&self) -> Capacity;
    fn contains(&self, box_id: &str) -> bool;

    fn free_space(&self) -> Capacity {
        match self.capacity() {
            Capacity::Bounded(total) => Capacity::Bounded(total.saturating_sub(self.len())),
            Capacity::Unbounded => Capacity::Unbounded,
        }
    }

    fn is_full(&self) -> bool {
        !self.free_space().fits(1)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A bounded LIFO pile of boxes. `boxes` is ordered bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub id: StackId,
    pub name: String,
    capacity: usize,
    boxes: Vec<BoxId>,
}

impl Stack {
    pub fn new(id: StackId, name: &str, capacity: usize, boxes: Vec<BoxId>) -> Self {
        Stack {
            id,
            name: name.to_string(),
            capacity,
            boxes,
        }
    }

    pub fn boxes(&self) -> &[BoxId] {
        &self.boxes
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.boxes.len())
    }

    /// 1-based position counted from the top, `Some(1)` being the top box.
    pub fn depth_of(&self, box_id: &str) -> Option<usize> {
        self.boxes
            .iter()
            .rev()
            .position(|b| b == box_id)
            .map(|index| index + 1)
    }

    /// Box `depth` places below the top (`0` is the top box).
    pub fn box_at_depth(&self, depth: usize) -> Option<&BoxId> {
        self.boxes.iter().rev().nth(depth)
    }
}

impl BoxStorage for Stack {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, box_id: BoxId) -> Result<(), BoxId> {
        if self.boxes.len() >= self.capacity {
            return Err(box_id);
        }
        self.boxes.push(box_id);
        Ok(())
    }

    fn pop(&mut self) -> Option<BoxId> {
        self.boxes.pop()
    }

    fn peek(&self) -> Option<&BoxId> {
        self.boxes.last()
    }

    fn len(&self) -> usize {
        self.boxes.len()
    }

    fn capacity(&self) -> Capacity {
        Capacity::Bounded(self.capacity)
    }

    fn contains(&self, box_id: &str) -> bool {
        self.boxes.iter().any(|b| b == box_id)
    }
}

/// Drop-off and pickup point at the warehouse boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferPoint {
    pub id: u32,
    pub name: String,
    boxes: Vec<BoxId>,
}

impl BufferPoint {
    pub fn new(id: u32, name: &str) -> Self {
        BufferPoint {
            id,
            name: name.to_string(),
            boxes: Vec::new(),
        }
    }

    /// Hands out a named box. Boxes arriving from outside the warehouse are
    /// not tracked here, so the box is always available.
    pub fn take(&mut self, box_id: &str) -> BoxId {
        if let Some(index) = self.boxes.iter().rposition(|b| b == box_id) {
            return self.boxes.remove(index);
        }
        box_id.to_string()
    }

    pub fn boxes(&self) -> &[BoxId] {
        &self.boxes
    }
}

impl BoxStorage for BufferPoint {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, box_id: BoxId) -> Result<(), BoxId> {
        self.boxes.push(box_id);
        Ok(())
    }

    fn pop(&mut self) -> Option<BoxId> {
        self.boxes.pop()
    }

    fn peek(&self) -> Option<&BoxId> {
        self.boxes.last()
    }

    fn len(&self) -> usize {
        self.boxes.len()
    }

    fn capacity(&self) -> Capacity {
        Capacity::Unbounded
    }

    fn contains(&self, box_id: &str) -> bool {
        self.boxes.iter().any(|b| b == box_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Stack(Stack),
    Buffer(BufferPoint),
}

impl Storage {
    pub fn is_buffer(&self) -> bool {
        matches!(self, Storage::Buffer(_))
    }

    pub fn as_stack(&self) -> Option<&Stack> {
        match self {
            Storage::Stack(stack) => Some(stack),
            Storage::Buffer(_) => None,
        }
    }

    pub fn as_stack_mut(&mut self) -> Option<&mut Stack> {
        match self {
            Storage::Stack(stack) => Some(stack),
            Storage::Buffer(_) => None,
        }
    }

    pub fn stack_id(&self) -> Option<StackId> {
        self.as_stack().map(|stack| stack.id)
    }

    /// Takes `wanted` from a buffer, or the top box from a stack.
    pub fn take(&mut self, wanted: &str) -> Option<BoxId> {
        match self {
            Storage::Stack(stack) => stack.pop(),
            Storage::Buffer(buffer) => Some(buffer.take(wanted)),
        }
    }

    fn inner(&self) -> &dyn BoxStorage {
        match self {
            Storage::Stack(stack) => stack,
            Storage::Buffer(buffer) => buffer,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn BoxStorage {
        match self {
            Storage::Stack(stack) => stack,
            Storage::Buffer(buffer) => buffer,
        }
    }
}

impl BoxStorage for Storage {
    fn id(&self) -> u32 {
        self.inner().id()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn push(&mut self, box_id: BoxId) -> Result<(), BoxId> {
        self.inner_mut().push(box_id)
    }

    fn pop(&mut self) -> Option<BoxId> {
        self.inner_mut().pop()
    }

    fn peek(&self) -> Option<&BoxId> {
        self.inner().peek()
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn capacity(&self) -> Capacity {
        self.inner().capacity()
    }

    fn contains(&self, box_id: &str) -> bool {
        self.inner().contains(box_id)
    }
}
