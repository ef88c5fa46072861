/// Sequential texture-unit allocator.
///
/// Units are handed out from zero; [`TextureUnits::reset`] must run once per shader use
/// before its samplers are bound. Running past `max` is reported but never refused.
#[derive(Debug, Clone)]
pub struct TextureUnits {
    used: u32,
    max: u32,
}

impl TextureUnits {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub fn alloc_unit(&mut self) -> u32 {
        let unit = self.used;
        self.used += 1;
        if unit >= self.max {
            log::error!("alloc unit {} exceeds max unit {}", unit, self.max);
        }
        unit
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn overflowed(&self) -> bool {
        self.used > self.max
    }
}
