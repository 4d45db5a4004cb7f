//! 8x8 DCT 变换.
//!
//! - 整数 IDCT: 基于 FFmpeg simple_idct, W 常量按 2^14 缩放, 兼容 IEEE 1180
//! - 浮点 IDCT / 正向 DCT: 双精度可分离矩阵乘法
//! - 单系数块的闭式解: 只有一个非零系数时, 输出即两个基函数的外积
//!
//! 所有函数使用自然 (行优先) 序, 下标为 `行 * 8 + 列`, 行对应垂直频率.

use std::f64::consts::PI;
use std::sync::OnceLock;

/// W 常量: cos(i*π/16) * √2 * 2^14
const W1: i64 = 22725;
const W2: i64 = 21407;
const W3: i64 = 19266;
const W4: i64 = 16383;
const W5: i64 = 12873;
const W6: i64 = 8867;
const W7: i64 = 4520;

const ROW_SHIFT: u32 = 11;
const COL_SHIFT: u32 = 20;
const DC_SHIFT: u32 = 3;

/// 单系数闭式解使用的基函数定点精度
const BASIS_BITS: u32 = 14;

/// 8 点一维 IDCT 蝶形, 返回未移位的输出
fn butterfly(x: [i64; 8], round: i64) -> [i64; 8] {
    let even = W4 * x[0] + round;
    let a = [
        even + W2 * x[2] + W4 * x[4] + W6 * x[6],
        even + W6 * x[2] - W4 * x[4] - W2 * x[6],
        even - W6 * x[2] - W4 * x[4] + W2 * x[6],
        even - W2 * x[2] + W4 * x[4] - W6 * x[6],
    ];
    let b = [
        W1 * x[1] + W3 * x[3] + W5 * x[5] + W7 * x[7],
        W3 * x[1] - W7 * x[3] - W1 * x[5] - W5 * x[7],
        W5 * x[1] - W1 * x[3] + W7 * x[5] + W3 * x[7],
        W7 * x[1] - W5 * x[3] + W3 * x[5] - W1 * x[7],
    ];
    [
        a[0] + b[0],
        a[1] + b[1],
        a[2] + b[2],
        a[3] + b[3],
        a[3] - b[3],
        a[2] - b[2],
        a[1] - b[1],
        a[0] - b[0],
    ]
}

/// 读取步长为 `stride` 的 8 个系数
fn gather(block: &[i32; 64], start: usize, stride: usize) -> [i64; 8] {
    std::array::from_fn(|i| i64::from(block[start + i * stride]))
}

/// 整数 8x8 IDCT (原地), 先行后列
pub fn idct_8x8_fixed(block: &mut [i32; 64]) {
    for row in 0..8 {
        let off = row * 8;
        let x = gather(block, off, 1);
        if x[1..].iter().all(|&v| v == 0) {
            // 只有 DC 的行直接放大
            block[off..off + 8].fill((x[0] << DC_SHIFT) as i32);
            continue;
        }
        let out = butterfly(x, 1 << (ROW_SHIFT - 1));
        for (dst, v) in block[off..off + 8].iter_mut().zip(out) {
            *dst = (v >> ROW_SHIFT) as i32;
        }
    }
    for col in 0..8 {
        let out = butterfly(gather(block, col, 8), 1 << (COL_SHIFT - 1));
        for (i, v) in out.into_iter().enumerate() {
            block[col + i * 8] = (v >> COL_SHIFT) as i32;
        }
    }
}

/// 基函数表: `basis[k][x] = C(k) / 2 * cos((2x + 1) kπ / 16)`, C(0) = 1/√2
fn float_basis() -> &'static [[f64; 8]; 8] {
    static BASIS: OnceLock<[[f64; 8]; 8]> = OnceLock::new();
    BASIS.get_or_init(|| {
        let mut basis = [[0.0; 8]; 8];
        for (k, row) in basis.iter_mut().enumerate() {
            let scale = if k == 0 { 0.5 / 2f64.sqrt() } else { 0.5 };
            for (x, value) in row.iter_mut().enumerate() {
                *value = scale * ((2 * x + 1) as f64 * k as f64 * PI / 16.0).cos();
            }
        }
        basis
    })
}

/// 定点基函数表 (2^14 缩放)
fn fixed_basis() -> &'static [[i64; 8]; 8] {
    static BASIS: OnceLock<[[i64; 8]; 8]> = OnceLock::new();
    BASIS.get_or_init(|| {
        let float = float_basis();
        let mut basis = [[0i64; 8]; 8];
        for k in 0..8 {
            for x in 0..8 {
                basis[k][x] = (float[k][x] * f64::from(1u32 << BASIS_BITS)).round() as i64;
            }
        }
        basis
    })
}

/// 浮点 8x8 IDCT
pub fn idct_8x8_float(coefficients: &[f64; 64], out: &mut [f64; 64]) {
    let basis = float_basis();
    let mut tmp = [0.0f64; 64];
    // 行: tmp[v][x] = Σ_u F[v][u] * basis[u][x]
    for v in 0..8 {
        for x in 0..8 {
            let mut sum = 0.0;
            for u in 0..8 {
                sum += coefficients[v * 8 + u] * basis[u][x];
            }
            tmp[v * 8 + x] = sum;
        }
    }
    // 列: out[y][x] = Σ_v basis[v][y] * tmp[v][x]
    for y in 0..8 {
        for x in 0..8 {
            let mut sum = 0.0;
            for v in 0..8 {
                sum += basis[v][y] * tmp[v * 8 + x];
            }
            out[y * 8 + x] = sum;
        }
    }
}

/// 浮点 8x8 正向 DCT
pub fn fdct_8x8_float(samples: &[f64; 64], out: &mut [f64; 64]) {
    let basis = float_basis();
    let mut tmp = [0.0f64; 64];
    for y in 0..8 {
        for u in 0..8 {
            let mut sum = 0.0;
            for x in 0..8 {
                sum += samples[y * 8 + x] * basis[u][x];
            }
            tmp[y * 8 + u] = sum;
        }
    }
    for v in 0..8 {
        for u in 0..8 {
            let mut sum = 0.0;
            for y in 0..8 {
                sum += basis[v][y] * tmp[y * 8 + u];
            }
            out[v * 8 + u] = sum;
        }
    }
}

/// 单系数块的整数闭式解
pub fn single_coefficient_fixed(natural_index: usize, value: i32, out: &mut [i32]) {
    let basis = fixed_basis();
    let (v, u) = (natural_index / 8, natural_index % 8);
    let round = 1i64 << (2 * BASIS_BITS - 1);
    let value = value as i64;
    for y in 0..8 {
        let vy = value * basis[v][y];
        for x in 0..8 {
            out[y * 8 + x] = ((vy * basis[u][x] + round) >> (2 * BASIS_BITS)) as i32;
        }
    }
}

/// 单系数块的浮点闭式解
pub fn single_coefficient_float(natural_index: usize, value: f64, out: &mut [f64]) {
    let basis = float_basis();
    let (v, u) = (natural_index / 8, natural_index % 8);
    for y in 0..8 {
        let vy = value * basis[v][y];
        for x in 0..8 {
            out[y * 8 + x] = vy * basis[u][x];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_coefficients() -> [i32; 64] {
        let mut coeffs = [0i32; 64];
        coeffs[0] = 320;
        coeffs[1] = -96;
        coeffs[8] = 57;
        coeffs[9] = 22;
        coeffs[18] = -40;
        coeffs[35] = 16;
        coeffs[63] = 8;
        coeffs
    }

    #[test]
    fn test_dc_only_fixed() {
        let mut block = [0i32; 64];
        block[0] = 200;
        idct_8x8_fixed(&mut block);
        assert!(block.iter().all(|&v| v == 25), "DC 200 应得到 25: {:?}", block);
    }

    #[test]
    fn test_fixed_matches_float_within_one() {
        let coeffs = sample_coefficients();
        let mut fixed = coeffs;
        idct_8x8_fixed(&mut fixed);

        let float_in: [f64; 64] = std::array::from_fn(|i| coeffs[i] as f64);
        let mut float_out = [0.0; 64];
        idct_8x8_float(&float_in, &mut float_out);

        for i in 0..64 {
            let diff = (fixed[i] as f64 - float_out[i].round()).abs();
            assert!(diff <= 1.0, "位置 {} 差异 {}: {} vs {}", i, diff, fixed[i], float_out[i]);
        }
    }

    #[test]
    fn test_forward_inverse_roundtrip() {
        let samples: [f64; 64] = std::array::from_fn(|i| ((i * 37) % 255) as f64 - 128.0);
        let mut coeffs = [0.0; 64];
        fdct_8x8_float(&samples, &mut coeffs);
        let mut back = [0.0; 64];
        idct_8x8_float(&coeffs, &mut back);
        for i in 0..64 {
            assert!((samples[i] - back[i]).abs() < 1e-9, "位置 {} 往返误差过大", i);
        }
    }

    #[test]
    fn test_single_coefficient_matches_general() {
        for &(index, value) in &[(0usize, 200i32), (1, -64), (9, 48), (27, 100), (63, -30)] {
            let mut general = [0i32; 64];
            general[index] = value;
            idct_8x8_fixed(&mut general);

            let mut closed = [0i32; 64];
            single_coefficient_fixed(index, value, &mut closed);
            for i in 0..64 {
                assert!(
                    (general[i] - closed[i]).abs() <= 1,
                    "系数 {} 位置 {}: {} vs {}",
                    index,
                    i,
                    general[i],
                    closed[i]
                );
            }

            let mut float_general_in = [0.0; 64];
            float_general_in[index] = value as f64;
            let mut float_general = [0.0; 64];
            idct_8x8_float(&float_general_in, &mut float_general);
            let mut float_closed = [0.0; 64];
            single_coefficient_float(index, value as f64, &mut float_closed);
            for i in 0..64 {
                assert!((float_general[i] - float_closed[i]).abs() < 1e-9);
            }
        }
    }
}
