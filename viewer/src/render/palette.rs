use image::Rgb;

/// 256-entry heat palette in the style of the classic JET colormap.
///
/// Index 0 is dark blue, the middle passes through cyan, green and yellow,
/// and index 255 is dark red.
pub struct HeatPalette {
    lut: [Rgb<u8>; 256],
}

impl HeatPalette {
    pub fn jet() -> Self {
        let mut lut = [Rgb([0, 0, 0]); 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            let x = i as f32 / 255.0;
            *entry = Rgb([
                channel(1.5 - (4.0 * x - 3.0).abs()),
                channel(1.5 - (4.0 * x - 2.0).abs()),
                channel(1.5 - (4.0 * x - 1.0).abs()),
            ]);
        }
        Self { lut }
    }

    pub fn color(&self, index: u8) -> Rgb<u8> {
        self.lut[index as usize]
    }
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
