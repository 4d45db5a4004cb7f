//! PS1 MDEC 色彩空间转换.
//!
//! MDEC 硬件使用自己的 YCbCr 系数, 与 JFIF / Rec.601 不同:
//! `R = Y + 1.402 Cr`, `G = Y - 0.3437 Cb - 0.7143 Cr`, `B = Y + 1.772 Cb`.
//! 其中 `Y = luma + 128`, Cb/Cr 以 0 为中心. 仅在输出像素时截断到 [0, 255].

/// Cr -> R
pub const CR_TO_R: f64 = 1.402;
/// Cb -> G (取负)
pub const CB_TO_G: f64 = 0.3437;
/// Cr -> G (取负)
pub const CR_TO_G: f64 = 0.7143;
/// Cb -> B
pub const CB_TO_B: f64 = 1.772;

const FIX_BITS: u32 = 12;
const FIX_ROUND: i32 = 1 << (FIX_BITS - 1);
const FIX_CR_TO_R: i32 = 5743;
const FIX_CB_TO_G: i32 = 1408;
const FIX_CR_TO_G: i32 = 2926;
const FIX_CB_TO_B: i32 = 7258;

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// 定点转换, `luma` 为 IDCT 输出 (未加 128)
#[inline]
pub fn ycbcr_to_rgb_fixed(luma: i32, cb: i32, cr: i32) -> [u8; 3] {
    let y = luma + 128;
    let r = y + ((FIX_CR_TO_R * cr + FIX_ROUND) >> FIX_BITS);
    let g = y + ((-FIX_CB_TO_G * cb - FIX_CR_TO_G * cr + FIX_ROUND) >> FIX_BITS);
    let b = y + ((FIX_CB_TO_B * cb + FIX_ROUND) >> FIX_BITS);
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

/// 浮点转换, `luma` 为 IDCT 输出 (未加 128)
#[inline]
pub fn ycbcr_to_rgb_float(luma: f64, cb: f64, cr: f64) -> [u8; 3] {
    let y = luma + 128.0;
    let r = y + CR_TO_R * cr;
    let g = y - CB_TO_G * cb - CR_TO_G * cr;
    let b = y + CB_TO_B * cb;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

/// RGB -> PS1 YCbCr 的逆矩阵, 返回 `(Y, Cb, Cr)`, Y 在 [0, 255] 范围
pub fn rgb_to_ycbcr(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    // 由 R、B 两式消去 Cb/Cr 后代入 G 式求 Y
    let kb = CB_TO_G / CB_TO_B;
    let kr = CR_TO_G / CR_TO_R;
    let y = (g + kb * b + kr * r) / (1.0 + kb + kr);
    let cb = (b - y) / CB_TO_B;
    let cr = (r - y) / CR_TO_R;
    (y, cb, cr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_float_agree() {
        for luma in (-128..=127).step_by(17) {
            for cb in (-128..=127).step_by(23) {
                for cr in (-128..=127).step_by(29) {
                    let a = ycbcr_to_rgb_fixed(luma, cb, cr);
                    let b = ycbcr_to_rgb_float(luma as f64, cb as f64, cr as f64);
                    for ch in 0..3 {
                        assert!(
                            (a[ch] as i32 - b[ch] as i32).abs() <= 1,
                            "({}, {}, {}) 通道 {}: {:?} vs {:?}",
                            luma,
                            cb,
                            cr,
                            ch,
                            a,
                            b
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_known_color() {
        assert_eq!(ycbcr_to_rgb_fixed(25, 25, 25), [188, 127, 197]);
        assert_eq!(ycbcr_to_rgb_float(25.0, 25.0, 25.0), [188, 127, 197]);
        assert_eq!(ycbcr_to_rgb_fixed(0, 0, 0), [128, 128, 128]);
    }

    #[test]
    fn test_inverse_matrix() {
        for &(r, g, b) in &[(0.0, 0.0, 0.0), (255.0, 0.0, 0.0), (12.0, 200.0, 99.0)] {
            let (y, cb, cr) = rgb_to_ycbcr(r, g, b);
            let back = [
                y + CR_TO_R * cr,
                y - CB_TO_G * cb - CR_TO_G * cr,
                y + CB_TO_B * cb,
            ];
            assert!((back[0] - r).abs() < 1e-9);
            assert!((back[1] - g).abs() < 1e-9);
            assert!((back[2] - b).abs() < 1e-9);
        }
    }
}
