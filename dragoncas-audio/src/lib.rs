/*! Audio output of DRAGONCAS.

Renders framed cassette blocks as the waveform a real Dragon or Tandy
Color Computer loads from tape: the [synth] module turns bytes into phase
continuous half sine pulses according to a [timing] spec, and [wav] wraps
the result in a RIFF/WAVE container while implementing the
[BlockSink][dragoncas_formats::block::BlockSink] seam of
`dragoncas-formats`.
*/
pub mod synth;
pub mod timing;
pub mod wav;
